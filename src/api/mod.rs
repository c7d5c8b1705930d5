//! Upload service collaborator
//!
//! The engine only talks to the server through [`UploadService`]:
//! - `types`: wire payloads
//! - `http`: reqwest implementation against the HTTP upload API

mod http;
mod types;

use async_trait::async_trait;

use crate::error::ServiceError;

pub use http::HttpUploadService;
pub use types::{
    ChunkReceipt, ChunkState, FinalizeResult, HealthStatus, InitiateRequest, MonitoringStats,
    SessionStatus, StorageStats, UploadMetrics, UploadSnapshot,
};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Open an upload session and return its id
    async fn initiate(&self, request: &InitiateRequest) -> ServiceResult<String>;

    async fn upload_chunk(
        &self,
        session_id: &str,
        chunk_index: u32,
        bytes: Vec<u8>,
    ) -> ServiceResult<ChunkReceipt>;

    async fn status(&self, session_id: &str) -> ServiceResult<SessionStatus>;

    async fn finalize(
        &self,
        session_id: &str,
        requester_id: Option<&str>,
    ) -> ServiceResult<FinalizeResult>;

    /// Release a session server-side. Callers treat this as best-effort.
    async fn cancel(&self, session_id: &str) -> ServiceResult<()>;

    async fn monitoring_stats(&self) -> ServiceResult<MonitoringStats>;

    async fn health(&self) -> ServiceResult<HealthStatus>;
}
