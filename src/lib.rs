//! Chunked media upload client
//!
//! - [`transfer`]: moves one file's chunks into one server session, with
//!   retry, reconciliation and cooperative pause/cancel
//! - [`queue`]: schedules many files under a concurrency limit
//! - [`api`]: the upload service the engine talks to, plus an HTTP client
//! - [`task`], [`history`], [`store`]: data model and caller-side state
//!
//! The crate logs through the `log` facade and never installs a logger.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod queue;
pub mod store;
pub mod task;
pub mod transfer;

pub use api::{HttpUploadService, UploadService};
pub use config::{ApiConfig, QueueConfig, TransferConfig, UploaderConfig};
pub use error::{ConfigError, ServiceError, UploadError};
pub use history::{HistoryEntry, HistoryStatus, UploadHistory};
pub use queue::{QueueSnapshot, TaskObserver, UploadQueue};
pub use store::UploadStore;
pub use task::{TaskEvent, UploadStatus, UploadTask};
pub use transfer::{AbortReason, AbortSignal, TransferEngine, TransferListener};
