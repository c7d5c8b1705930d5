use log::warn;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::state::TaskObserver;
use super::worker::{QueueCommand, QueueSnapshot, QueueWorker};
use crate::config::QueueConfig;
use crate::task::UploadTask;
use crate::transfer::TransferEngine;

/// Handle to a running upload queue. Cheap to clone; every clone talks to
/// the same worker.
///
/// Commands are applied in the order they are sent. Task state flows back
/// through the [`TaskObserver`] given to [`UploadQueue::start`].
#[derive(Clone)]
pub struct UploadQueue {
    commands: mpsc::UnboundedSender<QueueCommand>,
}

impl UploadQueue {
    /// Spawn the queue worker on the current tokio runtime
    pub fn start(
        engine: TransferEngine,
        observer: Arc<dyn TaskObserver>,
        config: QueueConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = QueueWorker::new(engine, observer, config, sender.downgrade());
        tokio::spawn(worker.run(receiver));
        Self { commands: sender }
    }

    fn send(&self, command: QueueCommand) {
        if self.commands.send(command).is_err() {
            warn!("upload_queue: worker stopped, command dropped");
        }
    }

    /// Append tasks at the back; ids already queued or active are skipped
    pub fn enqueue(&self, tasks: Vec<UploadTask>) {
        self.send(QueueCommand::Enqueue(tasks));
    }

    /// Stop an active upload after its in-flight request, or take a waiting
    /// one out of the queue. Uploaded chunks and the session are kept.
    pub fn pause(&self, task_id: &str) {
        self.send(QueueCommand::Pause(task_id.to_string()));
    }

    /// Stop the task and release its server session. A running upload
    /// releases the session it holds, or `session_id` when it never opened
    /// one; for a task that is not running `session_id` is released. No
    /// history entry is written and the caller drops the task from its list.
    pub fn cancel(&self, task_id: &str, session_id: Option<String>) {
        self.send(QueueCommand::Cancel {
            task_id: task_id.to_string(),
            session_id,
        });
    }

    /// Put a paused task back at the front of the queue, reconciled against
    /// the server when it already has a session
    pub fn resume(&self, task: UploadTask) {
        self.send(QueueCommand::Resume(task));
    }

    /// Restart a failed task from zero at the front of the queue
    pub fn retry(&self, task: UploadTask) {
        self.send(QueueCommand::Retry(task));
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let (respond, response) = oneshot::channel();
        self.send(QueueCommand::Snapshot { respond });
        response.await.unwrap_or_default()
    }

    pub async fn active_count(&self) -> usize {
        self.snapshot().await.active.len()
    }

    pub async fn queue_len(&self) -> usize {
        self.snapshot().await.queued.len()
    }

    /// Pause every active upload and stop the worker
    pub fn shutdown(&self) {
        self.send(QueueCommand::Shutdown);
    }
}
