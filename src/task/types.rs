//! Upload task model and the events that update it

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::source::ByteSource;
use crate::api::{ChunkState, FinalizeResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "finalizing")]
    Finalizing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "error")]
    Error,
}

impl UploadStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Paused => write!(f, "paused"),
            UploadStatus::Finalizing => write!(f, "finalizing"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Error => write!(f, "error"),
        }
    }
}

impl From<String> for UploadStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => UploadStatus::Pending,
            "uploading" => UploadStatus::Uploading,
            "paused" => UploadStatus::Paused,
            "finalizing" => UploadStatus::Finalizing,
            "completed" => UploadStatus::Completed,
            "error" => UploadStatus::Error,
            _ => UploadStatus::Pending,
        }
    }
}

/// Number of chunks needed for `size` bytes
pub fn chunk_count(size: u64, chunk_size: u64) -> u32 {
    size.div_ceil(chunk_size.max(1)) as u32
}

/// Client-local upload id: filename, batch index and a random suffix
pub fn build_task_id(filename: &str, index: usize) -> String {
    format!("{}-{}-{}", filename, index, Uuid::new_v4().simple())
}

/// One file being transferred
#[derive(Clone)]
pub struct UploadTask {
    pub id: String,
    pub filename: String,
    /// Read-only handle to the bytes; owned by the caller
    pub source: Arc<dyn ByteSource>,
    pub size: u64,
    pub mime_type: String,
    pub total_chunks: u32,
    /// Chunks the server confirmed
    pub uploaded_chunks: BTreeSet<u32>,
    pub session_id: Option<String>,
    pub status: UploadStatus,
    /// Highest progress recorded while active, never lowered by reconciliation
    pub progress_percent: f64,
    pub content_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_duration: Duration,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl std::fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTask")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("total_chunks", &self.total_chunks)
            .field("uploaded_chunks", &self.uploaded_chunks.len())
            .field("session_id", &self.session_id)
            .field("status", &self.status)
            .field("progress_percent", &self.progress_percent)
            .finish_non_exhaustive()
    }
}

impl UploadTask {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        source: Arc<dyn ByteSource>,
        size: u64,
        mime_type: impl Into<String>,
        chunk_size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            source,
            size,
            mime_type: mime_type.into(),
            total_chunks: chunk_count(size, chunk_size),
            uploaded_chunks: BTreeSet::new(),
            session_id: None,
            status: UploadStatus::Pending,
            progress_percent: 0.0,
            content_hash: None,
            started_at: Utc::now(),
            paused_at: None,
            paused_duration: Duration::zero(),
            ended_at: None,
            last_error: None,
        }
    }

    /// Progress implied by the current chunk set
    pub fn computed_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.uploaded_chunks.len() as f64 * 100.0 / self.total_chunks as f64
    }

    /// Ratchet `progress_percent` up to the computed value and return it
    pub fn record_progress(&mut self) -> f64 {
        self.progress_percent = self.progress_percent.max(self.computed_percent());
        self.progress_percent
    }

    pub fn uploaded_list(&self) -> Vec<u32> {
        self.uploaded_chunks.iter().copied().collect()
    }

    /// Chunk indices not yet confirmed, ascending
    pub fn pending_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.uploaded_chunks.contains(i))
            .collect()
    }

    /// Reconcile against server-reported chunk state.
    ///
    /// The server's total always wins. The uploaded set is replaced by the
    /// complement of the missing list only when that does not lower the
    /// recorded progress, or when nothing is uploaded locally. Returns
    /// whether the server's chunk set was adopted.
    pub fn apply_server_state(&mut self, state: &ChunkState) -> bool {
        self.total_chunks = state.total_chunks;

        let missing: BTreeSet<u32> = state.missing_chunk_indices.iter().copied().collect();
        let server_uploaded: BTreeSet<u32> = (0..state.total_chunks)
            .filter(|i| !missing.contains(i))
            .collect();
        let server_percent = if state.total_chunks == 0 {
            0.0
        } else {
            server_uploaded.len() as f64 * 100.0 / state.total_chunks as f64
        };

        let adopt = self.uploaded_chunks.is_empty() || server_percent >= self.progress_percent;
        if adopt {
            self.uploaded_chunks = server_uploaded;
        } else {
            let total = state.total_chunks;
            self.uploaded_chunks.retain(|i| *i < total);
        }
        self.record_progress();
        adopt
    }

    /// Fold the time spent paused into the running total and clear the pause
    pub fn resume_from_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            let paused_for = now - paused_at;
            if paused_for > Duration::zero() {
                self.paused_duration = self.paused_duration + paused_for;
            }
        }
        self.ended_at = None;
    }

    /// Start over: a retry discards partial progress
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = UploadStatus::Pending;
        self.uploaded_chunks.clear();
        self.progress_percent = 0.0;
        self.last_error = None;
        self.started_at = now;
        self.paused_at = None;
        self.paused_duration = Duration::zero();
        self.ended_at = None;
    }

    /// Elapsed active time, excluding pauses
    pub fn active_duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.paused_at.or(self.ended_at).unwrap_or(now);
        let elapsed = end - self.started_at - self.paused_duration;
        elapsed.max(Duration::zero())
    }

    pub fn apply(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::SessionAssigned { session_id } => {
                if self.session_id.is_none() {
                    self.session_id = Some(session_id.clone());
                }
            }
            TaskEvent::Started => {
                self.status = UploadStatus::Uploading;
                self.last_error = None;
            }
            TaskEvent::Progress {
                percent,
                uploaded_chunks,
                total_chunks,
            } => {
                self.uploaded_chunks = uploaded_chunks.iter().copied().collect();
                self.total_chunks = *total_chunks;
                self.progress_percent = self.progress_percent.max(*percent);
            }
            TaskEvent::Finalizing => {
                self.status = UploadStatus::Finalizing;
                self.progress_percent = 100.0;
            }
            TaskEvent::Completed { ended_at, .. } => {
                self.status = UploadStatus::Completed;
                self.progress_percent = 100.0;
                self.ended_at = Some(*ended_at);
            }
            TaskEvent::Failed { reason, ended_at } => {
                self.status = UploadStatus::Error;
                self.last_error = Some(reason.clone());
                self.ended_at = Some(*ended_at);
            }
            TaskEvent::Paused { paused_at } => {
                self.status = UploadStatus::Paused;
                self.paused_at = Some(*paused_at);
                self.ended_at = Some(*paused_at);
            }
            TaskEvent::Requeued {
                uploaded_chunks,
                total_chunks,
                percent,
                paused_duration_ms,
            } => {
                self.status = UploadStatus::Pending;
                self.uploaded_chunks = uploaded_chunks.iter().copied().collect();
                self.total_chunks = *total_chunks;
                self.progress_percent = *percent;
                self.paused_duration = Duration::milliseconds(*paused_duration_ms);
                self.paused_at = None;
                self.ended_at = None;
                self.last_error = None;
            }
            TaskEvent::Reset { started_at } => self.reset_for_retry(*started_at),
        }
    }
}

/// Partial update published for a task.
///
/// The queue and engine never own the caller's task list; they describe
/// what changed and the caller folds it in with [`UploadTask::apply`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    SessionAssigned {
        session_id: String,
    },
    Started,
    Progress {
        percent: f64,
        uploaded_chunks: Vec<u32>,
        total_chunks: u32,
    },
    Finalizing,
    Completed {
        result: FinalizeResult,
        ended_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        ended_at: DateTime<Utc>,
    },
    Paused {
        paused_at: DateTime<Utc>,
    },
    Requeued {
        uploaded_chunks: Vec<u32>,
        total_chunks: u32,
        percent: f64,
        paused_duration_ms: i64,
    },
    Reset {
        started_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Status the task is in after this event, if the event sets one
    pub fn status(&self) -> Option<UploadStatus> {
        match self {
            TaskEvent::Started => Some(UploadStatus::Uploading),
            TaskEvent::Finalizing => Some(UploadStatus::Finalizing),
            TaskEvent::Completed { .. } => Some(UploadStatus::Completed),
            TaskEvent::Failed { .. } => Some(UploadStatus::Error),
            TaskEvent::Paused { .. } => Some(UploadStatus::Paused),
            TaskEvent::Requeued { .. } | TaskEvent::Reset { .. } => Some(UploadStatus::Pending),
            TaskEvent::SessionAssigned { .. } | TaskEvent::Progress { .. } => None,
        }
    }
}
