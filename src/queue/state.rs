use log::{info, warn};

use crate::history::HistoryEntry;
use crate::task::TaskEvent;
use crate::transfer::TransferListener;

/// Caller-side sink for task updates and history records.
///
/// Called from the queue worker and from running transfers; implementations
/// must not block.
pub trait TaskObserver: Send + Sync {
    fn on_task_event(&self, task_id: &str, event: &TaskEvent);

    /// Exactly once per task that completes or fails
    fn on_history(&self, entry: HistoryEntry);
}

pub(crate) fn publish(observer: &dyn TaskObserver, task_id: &str, event: TaskEvent) {
    match (&event, event.status()) {
        (TaskEvent::Failed { reason, .. }, _) => {
            warn!("upload_status: {} -> error error={}", task_id, reason)
        }
        (_, Some(status)) => info!("upload_status: {} -> {}", task_id, status),
        _ => {}
    }
    observer.on_task_event(task_id, &event);
}

/// Forwards engine progress of one run to the observer
pub(crate) struct ObserverListener<'a> {
    pub task_id: &'a str,
    pub observer: &'a dyn TaskObserver,
}

impl TransferListener for ObserverListener<'_> {
    fn on_session(&self, session_id: &str) {
        publish(
            self.observer,
            self.task_id,
            TaskEvent::SessionAssigned {
                session_id: session_id.to_string(),
            },
        );
    }

    fn on_progress(&self, percent: f64, uploaded_chunks: &[u32], total_chunks: u32) {
        publish(
            self.observer,
            self.task_id,
            TaskEvent::Progress {
                percent,
                uploaded_chunks: uploaded_chunks.to_vec(),
                total_chunks,
            },
        );
    }

    fn on_finalizing(&self) {
        publish(self.observer, self.task_id, TaskEvent::Finalizing);
    }
}
