//! Uploader configuration
//!
//! Every section deserializes with defaults, so a config file only needs the
//! keys it wants to override.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Fixed chunk size used by the upload service: 1 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum concurrent file uploads
pub const MAX_CONCURRENT_UPLOADS: usize = 3;

/// Retries after the first failed attempt of a chunk
pub const MAX_CHUNK_RETRIES: u32 = 3;

const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub settle_delay_ms: u64,
    /// Identity passed along when finalizing, if the server wants one
    pub requester_id: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: MAX_CHUNK_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            requester_id: None,
        }
    }
}

impl TransferConfig {
    /// Backoff before retry number `attempt + 1`: 1s, 2s, 4s with the defaults
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub concurrency: usize,
    /// Run a scheduling step as soon as an active upload is cancelled.
    /// When false the freed slot stays idle until the next enqueue or
    /// completion.
    pub schedule_on_cancel: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: MAX_CONCURRENT_UPLOADS,
            schedule_on_cancel: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploaderConfig {
    pub api: ApiConfig,
    pub transfer: TransferConfig,
    pub queue: QueueConfig,
}

impl UploaderConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: UploaderConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::Invalid("transfer.chunk_size must be > 0".into()));
        }
        if self.queue.concurrency == 0 {
            return Err(ConfigError::Invalid("queue.concurrency must be > 0".into()));
        }
        Ok(())
    }
}
