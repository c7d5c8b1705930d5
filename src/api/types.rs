//! Request and response payloads of the upload service

use serde::{Deserialize, Serialize};

/// Upload intent sent when opening a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitiateRequest {
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub total_chunks: u32,
    /// Optional content digest the server may use for deduplication.
    /// The field keeps the service's historical name.
    #[serde(rename = "md5", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InitiateResponse {
    pub upload_id: String,
}

/// Acknowledgement of one received chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkReceipt {
    #[serde(rename = "progress")]
    pub progress_percent: f64,
    #[serde(rename = "uploaded_chunks")]
    pub uploaded_count: u32,
    pub total_chunks: u32,
}

/// Server-side view of a session's chunks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    #[serde(default)]
    pub upload_id: String,
    pub total_chunks: u32,
    #[serde(default)]
    pub uploaded_chunks: u32,
    #[serde(rename = "missing_chunks", default)]
    pub missing_chunk_indices: Vec<u32>,
    #[serde(rename = "progress", default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub status: String,
}

/// Authoritative chunk state used for reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkState {
    pub total_chunks: u32,
    pub missing_chunk_indices: Vec<u32>,
}

impl From<SessionStatus> for ChunkState {
    fn from(status: SessionStatus) -> Self {
        Self {
            total_chunks: status.total_chunks,
            missing_chunk_indices: status.missing_chunk_indices,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FinalizeRequest<'a> {
    pub upload_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
}

/// Outcome of assembling the uploaded chunks into a file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinalizeResult {
    #[serde(default)]
    pub message: String,
    pub file_path: String,
    pub filename: String,
    #[serde(rename = "file_size")]
    pub size: u64,
    #[serde(rename = "md5", default)]
    pub content_hash: String,
    #[serde(default)]
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub total_size: u64,
    #[serde(default)]
    pub total_size_mb: f64,
    pub file_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSnapshot {
    pub upload_id: String,
    pub filename: String,
    pub progress: f64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadMetrics {
    pub total_uploads: u64,
    pub successful_uploads: u64,
    pub success_rate: f64,
}

/// Aggregate numbers from the monitoring endpoint, read-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoringStats {
    pub storage: StorageStats,
    pub active_uploads: u64,
    #[serde(default)]
    pub upload_details: Vec<UploadSnapshot>,
    pub metrics: UploadMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub services: std::collections::HashMap<String, String>,
}

/// Error body returned by the service on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        if let Some(message) = self.message {
            return Some(message);
        }
        match self.detail? {
            serde_json::Value::String(detail) => Some(detail),
            other => Some(other.to_string()),
        }
    }
}
