//! Error types shared by the transfer engine and the upload queue

use thiserror::Error;

use crate::transfer::AbortReason;

/// Generic failure text shown when the server gave no reason
pub const GENERIC_FAILURE: &str = "Upload failed";

/// Failure reported by the upload service collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("server returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Http { status: u16, message: Option<String> },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Message supplied by the server in the error body, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ServiceError::Http {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Unrecovered outcome of a transfer. Transient chunk failures are retried
/// inside the engine and never show up here.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to start upload session: {0}")]
    SessionInitiation(#[source] ServiceError),

    #[error("chunk {index} failed after {attempts} attempts: {source}")]
    TerminalChunk {
        index: u32,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("failed to fetch upload status: {0}")]
    Reconciliation(#[source] ServiceError),

    #[error("failed to finalize upload: {0}")]
    Finalization(#[source] ServiceError),

    #[error("failed to read chunk {index}: {source}")]
    Source {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("upload {0}")]
    Aborted(AbortReason),
}

impl UploadError {
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            UploadError::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }

    /// User-visible failure reason: the server's message when it sent one
    pub fn reason(&self) -> String {
        let service = match self {
            UploadError::SessionInitiation(e)
            | UploadError::Reconciliation(e)
            | UploadError::Finalization(e) => Some(e),
            UploadError::TerminalChunk { source, .. } => Some(source),
            UploadError::Source { .. } => None,
            UploadError::Aborted(reason) => return format!("Upload {}", reason),
        };
        service
            .and_then(ServiceError::server_message)
            .unwrap_or(GENERIC_FAILURE)
            .to_string()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
