//! Queue worker - admits uploads up to the concurrency limit and reacts to
//! pause, cancel, resume, retry and transfer completion

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::registry::ActiveRegistry;
use super::state::{publish, ObserverListener, TaskObserver};
use crate::api::{ChunkState, FinalizeResult};
use crate::config::QueueConfig;
use crate::error::UploadError;
use crate::history::HistoryEntry;
use crate::task::{TaskEvent, UploadStatus, UploadTask};
use crate::transfer::{AbortReason, AbortSignal, TransferEngine};

/// Point-in-time view of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Tasks holding a slot, sorted by id
    pub active: Vec<String>,
    /// Waiting tasks in admission order
    pub queued: Vec<String>,
    /// Resumed tasks whose server state is still being fetched
    pub reconciling: Vec<String>,
}

pub(crate) enum QueueCommand {
    Enqueue(Vec<UploadTask>),
    Pause(String),
    Cancel {
        task_id: String,
        session_id: Option<String>,
    },
    Resume(UploadTask),
    Retry(UploadTask),
    Reconciled {
        task: UploadTask,
        state: Option<ChunkState>,
    },
    Finished {
        task: UploadTask,
        run_id: u64,
        outcome: Result<FinalizeResult, UploadError>,
    },
    Snapshot {
        respond: oneshot::Sender<QueueSnapshot>,
    },
    Shutdown,
}

pub(crate) struct QueueWorker {
    engine: TransferEngine,
    observer: Arc<dyn TaskObserver>,
    config: QueueConfig,
    waiting: VecDeque<UploadTask>,
    active: ActiveRegistry,
    /// Resumed tasks awaiting server state, with the pause they came out of
    reconciling: HashMap<String, Option<DateTime<Utc>>>,
    /// Cancelled runs still unwinding, with the session the caller named
    cancelled_runs: HashMap<u64, Option<String>>,
    next_run_id: u64,
    /// Weak so the worker stops once every handle and running transfer is gone
    commands: mpsc::WeakUnboundedSender<QueueCommand>,
}

impl QueueWorker {
    pub fn new(
        engine: TransferEngine,
        observer: Arc<dyn TaskObserver>,
        config: QueueConfig,
        commands: mpsc::WeakUnboundedSender<QueueCommand>,
    ) -> Self {
        Self {
            engine,
            observer,
            config,
            waiting: VecDeque::new(),
            active: ActiveRegistry::default(),
            reconciling: HashMap::new(),
            cancelled_runs: HashMap::new(),
            next_run_id: 0,
            commands,
        }
    }

    pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<QueueCommand>) {
        info!(
            "upload_queue: worker started concurrency={}",
            self.config.concurrency
        );
        while let Some(command) = receiver.recv().await {
            match command {
                QueueCommand::Enqueue(tasks) => self.enqueue(tasks),
                QueueCommand::Pause(task_id) => self.pause(&task_id),
                QueueCommand::Cancel {
                    task_id,
                    session_id,
                } => self.cancel(&task_id, session_id),
                QueueCommand::Resume(task) => self.resume(task),
                QueueCommand::Retry(task) => self.retry(task),
                QueueCommand::Reconciled { task, state } => self.reconciled(task, state),
                QueueCommand::Finished {
                    task,
                    run_id,
                    outcome,
                } => self.finished(task, run_id, outcome),
                QueueCommand::Snapshot { respond } => {
                    let _ = respond.send(self.snapshot());
                }
                QueueCommand::Shutdown => {
                    self.shutdown();
                    break;
                }
            }
        }
        info!("upload_queue: worker stopped");
    }

    fn is_known(&self, task_id: &str) -> bool {
        self.active.contains(task_id)
            || self.reconciling.contains_key(task_id)
            || self.waiting.iter().any(|t| t.id == task_id)
    }

    fn take_waiting(&mut self, task_id: &str) -> Option<UploadTask> {
        let position = self.waiting.iter().position(|t| t.id == task_id)?;
        self.waiting.remove(position)
    }

    fn enqueue(&mut self, tasks: Vec<UploadTask>) {
        let mut added = 0;
        for mut task in tasks {
            if self.is_known(&task.id) {
                debug!("upload_enqueue: {} already queued, skipping", task.id);
                continue;
            }
            task.status = UploadStatus::Pending;
            self.waiting.push_back(task);
            added += 1;
        }
        info!(
            "upload_enqueue: added={} queued={} active={}",
            added,
            self.waiting.len(),
            self.active.len()
        );
        self.schedule();
    }

    /// Admit waiting tasks front-first while a slot is free
    fn schedule(&mut self) {
        while self.active.len() < self.config.concurrency {
            let Some(commands) = self.commands.upgrade() else {
                warn!("upload_queue: no handles left, not admitting");
                return;
            };
            let Some(task) = self.waiting.pop_front() else {
                return;
            };
            self.admit(task, commands);
        }
    }

    fn admit(&mut self, mut task: UploadTask, commands: mpsc::UnboundedSender<QueueCommand>) {
        self.next_run_id += 1;
        let run_id = self.next_run_id;
        let abort = self.active.insert(&task.id, run_id);

        task.status = UploadStatus::Uploading;
        task.last_error = None;
        publish(self.observer.as_ref(), &task.id, TaskEvent::Started);
        info!(
            "upload_admit: {} run={} active={}/{} queued={}",
            task.id,
            run_id,
            self.active.len(),
            self.config.concurrency,
            self.waiting.len()
        );

        let engine = self.engine.clone();
        let observer = self.observer.clone();
        tokio::spawn(run_transfer(engine, observer, task, abort, run_id, commands));
    }

    fn pause(&mut self, task_id: &str) {
        // a task still reconciling keeps the pause it was resumed from
        let paused_at = match self.reconciling.remove(task_id) {
            Some(previous) => Some(previous.unwrap_or_else(Utc::now)),
            None => self.take_waiting(task_id).map(|_| Utc::now()),
        };
        if let Some(paused_at) = paused_at {
            publish(
                self.observer.as_ref(),
                task_id,
                TaskEvent::Paused { paused_at },
            );
            return;
        }
        match self.active.get(task_id) {
            Some(upload) => {
                info!("upload_pause: {} run={}", task_id, upload.run_id);
                upload.abort.abort(AbortReason::Paused);
            }
            None => debug!("upload_pause: {} not queued or active", task_id),
        }
    }

    fn cancel(&mut self, task_id: &str, session_id: Option<String>) {
        let was_waiting =
            self.take_waiting(task_id).is_some() || self.reconciling.remove(task_id).is_some();

        if let Some(upload) = self.active.remove(task_id) {
            info!("upload_cancel: {} run={}", task_id, upload.run_id);
            // the session is released once the run unwinds
            self.cancelled_runs.insert(upload.run_id, session_id);
            upload.abort.abort(AbortReason::Cancelled);
            if self.config.schedule_on_cancel {
                self.schedule();
            }
            return;
        }

        debug!("upload_cancel: {} idle waiting={}", task_id, was_waiting);
        if let Some(session_id) = session_id {
            self.engine.release_session(session_id);
        }
    }

    fn resume(&mut self, mut task: UploadTask) {
        if self.is_known(&task.id) {
            debug!("upload_resume: {} still queued or active, ignoring", task.id);
            return;
        }
        let paused_at = task.paused_at;
        task.resume_from_pause(Utc::now());
        task.status = UploadStatus::Pending;

        let Some(session_id) = task.session_id.clone() else {
            self.requeue_front(task);
            return;
        };
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        self.reconciling.insert(task.id.clone(), paused_at);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let state = match engine.fetch_chunk_state(&session_id).await {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(
                        "upload_resume_reconcile_failed: {} error={}, keeping local chunks",
                        task.id, e
                    );
                    None
                }
            };
            let _ = commands.send(QueueCommand::Reconciled { task, state });
        });
    }

    fn reconciled(&mut self, mut task: UploadTask, state: Option<ChunkState>) {
        if self.reconciling.remove(&task.id).is_none() {
            debug!(
                "upload_resume: {} paused or cancelled while reconciling",
                task.id
            );
            return;
        }
        if let Some(state) = state {
            task.apply_server_state(&state);
        }
        self.requeue_front(task);
    }

    fn retry(&mut self, mut task: UploadTask) {
        if self.is_known(&task.id) {
            debug!("upload_retry: {} still queued or active, ignoring", task.id);
            return;
        }
        let now = Utc::now();
        task.reset_for_retry(now);
        publish(
            self.observer.as_ref(),
            &task.id,
            TaskEvent::Reset { started_at: now },
        );
        self.waiting.push_front(task);
        self.schedule();
    }

    fn requeue_front(&mut self, task: UploadTask) {
        publish(
            self.observer.as_ref(),
            &task.id,
            TaskEvent::Requeued {
                uploaded_chunks: task.uploaded_list(),
                total_chunks: task.total_chunks,
                percent: task.progress_percent,
                paused_duration_ms: task.paused_duration.num_milliseconds(),
            },
        );
        self.waiting.push_front(task);
        self.schedule();
    }

    fn finished(
        &mut self,
        task: UploadTask,
        run_id: u64,
        outcome: Result<FinalizeResult, UploadError>,
    ) {
        let Some(upload) = self.active.remove_run(&task.id, run_id) else {
            self.finished_stale(&task, run_id, &outcome);
            return;
        };
        let now = Utc::now();

        let err = match outcome {
            Ok(result) => {
                self.observer
                    .on_history(HistoryEntry::completed(&task, &result, now));
                publish(
                    self.observer.as_ref(),
                    &task.id,
                    TaskEvent::Completed {
                        result,
                        ended_at: now,
                    },
                );
                self.schedule();
                return;
            }
            Err(err) => err,
        };

        match upload.abort.reason().or_else(|| err.abort_reason()) {
            Some(AbortReason::Paused) => {
                publish(
                    self.observer.as_ref(),
                    &task.id,
                    TaskEvent::Paused { paused_at: now },
                );
                info!(
                    "upload_paused: {} chunks={}/{} active={}",
                    task.id,
                    task.uploaded_chunks.len(),
                    task.total_chunks,
                    self.active.len()
                );
            }
            Some(AbortReason::Cancelled) => {
                debug!("upload_finished: {} cancelled", task.id);
            }
            None => {
                self.observer.on_history(HistoryEntry::failed(&task, now));
                publish(
                    self.observer.as_ref(),
                    &task.id,
                    TaskEvent::Failed {
                        reason: err.reason(),
                        ended_at: now,
                    },
                );
                self.schedule();
            }
        }
    }

    /// A run that lost its slot; a cancelled one still owes its session
    fn finished_stale(
        &mut self,
        task: &UploadTask,
        run_id: u64,
        outcome: &Result<FinalizeResult, UploadError>,
    ) {
        let Some(named_session) = self.cancelled_runs.remove(&run_id) else {
            debug!("upload_finished: {} run={} no longer active", task.id, run_id);
            return;
        };
        if outcome.is_ok() || released_on_unwind(outcome) {
            debug!("upload_finished: {} run={} cancelled", task.id, run_id);
            return;
        }
        match task.session_id.clone().or(named_session) {
            Some(session_id) => {
                info!(
                    "upload_cancel: {} run={} releasing {} after unwind",
                    task.id, run_id, session_id
                );
                self.engine.release_session(session_id);
            }
            None => debug!("upload_cancel: {} run={} had no session", task.id, run_id),
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        let mut reconciling: Vec<String> = self.reconciling.keys().cloned().collect();
        reconciling.sort();
        QueueSnapshot {
            active: self.active.ids(),
            queued: self.waiting.iter().map(|t| t.id.clone()).collect(),
            reconciling,
        }
    }

    /// Pause everything in flight and drop the waiting list
    fn shutdown(&mut self) {
        let now = Utc::now();
        for (task_id, upload) in self.active.drain() {
            upload.abort.abort(AbortReason::Paused);
            publish(
                self.observer.as_ref(),
                &task_id,
                TaskEvent::Paused { paused_at: now },
            );
        }
        info!(
            "upload_queue: shutdown dropped_queued={} dropped_reconciling={}",
            self.waiting.len(),
            self.reconciling.len()
        );
        self.waiting.clear();
        self.reconciling.clear();
    }
}

async fn run_transfer(
    engine: TransferEngine,
    observer: Arc<dyn TaskObserver>,
    mut task: UploadTask,
    abort: AbortSignal,
    run_id: u64,
    commands: mpsc::UnboundedSender<QueueCommand>,
) {
    let task_id = task.id.clone();
    let listener = ObserverListener {
        task_id: &task_id,
        observer: observer.as_ref(),
    };
    let outcome = engine.transfer(&mut task, &listener, &abort).await;

    if released_on_unwind(&outcome) {
        if let Some(session_id) = task.session_id.clone() {
            engine.release_session(session_id);
        }
    }

    let _ = commands.send(QueueCommand::Finished {
        task,
        run_id,
        outcome,
    });
}

/// Whether the run saw the cancel itself and so releases its own session
fn released_on_unwind(outcome: &Result<FinalizeResult, UploadError>) -> bool {
    matches!(
        outcome.as_ref().err().and_then(UploadError::abort_reason),
        Some(AbortReason::Cancelled)
    )
}
