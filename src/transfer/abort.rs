//! Cooperative abort signal tagged with why the transfer was stopped

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AbortReason {
    Paused,
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Paused => write!(f, "paused"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Abort handle shared between the queue and one transfer run.
///
/// The reason is stored before the token fires, so whoever observes the
/// cancellation can always read it.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<AbortReason>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. Cancelled overrides an earlier pause.
    pub fn abort(&self, reason: AbortReason) {
        {
            let mut current = self.reason.lock().unwrap_or_else(|e| e.into_inner());
            if *current != Some(AbortReason::Cancelled) {
                *current = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once an abort was requested
    pub async fn aborted(&self) -> AbortReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(AbortReason::Cancelled)
    }
}
