//! Chunk transfer engine - moves one file's chunks into one upload session

use log::{debug, error, info, warn};
use std::cmp::min;
use std::sync::Arc;

use super::abort::{AbortReason, AbortSignal};
use crate::api::{ChunkReceipt, ChunkState, FinalizeResult, InitiateRequest, UploadService};
use crate::config::TransferConfig;
use crate::error::UploadError;
use crate::task::UploadTask;

/// Receives progress while a transfer runs. The terminal outcome is the
/// return value of [`TransferEngine::transfer`].
pub trait TransferListener: Send + Sync {
    /// The server accepted the upload intent
    fn on_session(&self, _session_id: &str) {}

    fn on_progress(&self, percent: f64, uploaded_chunks: &[u32], total_chunks: u32);

    /// All chunks are on the server; assembly has not finished yet
    fn on_finalizing(&self) {}
}

fn check_abort(abort: &AbortSignal) -> Result<(), UploadError> {
    if abort.is_aborted() {
        return Err(UploadError::Aborted(
            abort.reason().unwrap_or(AbortReason::Cancelled),
        ));
    }
    Ok(())
}

/// Stateless across tasks: every call works on the task it is handed, so
/// several transfers can share one engine.
#[derive(Clone)]
pub struct TransferEngine {
    service: Arc<dyn UploadService>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(service: Arc<dyn UploadService>, config: TransferConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Byte range `[start, end)` of chunk `index`
    pub fn chunk_range(&self, index: u32, size: u64) -> (u64, u64) {
        let start = min(index as u64 * self.config.chunk_size, size);
        let end = min(start + self.config.chunk_size, size);
        (start, end)
    }

    /// Upload every missing chunk of `task` and finalize the session.
    ///
    /// Reuses `task.session_id` when present, which is what makes a resume
    /// pick up where the last run stopped. Pause and cancel come back as
    /// [`UploadError::Aborted`].
    pub async fn transfer(
        &self,
        task: &mut UploadTask,
        listener: &dyn TransferListener,
        abort: &AbortSignal,
    ) -> Result<FinalizeResult, UploadError> {
        check_abort(abort)?;

        let session_id = match task.session_id.clone() {
            Some(session_id) => session_id,
            None => {
                let request = InitiateRequest {
                    filename: task.filename.clone(),
                    file_size: task.size,
                    mime_type: task.mime_type.clone(),
                    total_chunks: task.total_chunks,
                    content_hash: task.content_hash.clone(),
                };
                let session_id = self
                    .service
                    .initiate(&request)
                    .await
                    .map_err(UploadError::SessionInitiation)?;
                info!(
                    "transfer_session: {} -> {} size={} chunks={}",
                    task.id, session_id, task.size, task.total_chunks
                );
                task.session_id = Some(session_id.clone());
                listener.on_session(&session_id);
                session_id
            }
        };
        check_abort(abort)?;

        match self.fetch_chunk_state(&session_id).await {
            Ok(state) => {
                let adopted = task.apply_server_state(&state);
                debug!(
                    "transfer_reconcile: {} total={} missing={} adopted={}",
                    task.id,
                    state.total_chunks,
                    state.missing_chunk_indices.len(),
                    adopted
                );
            }
            Err(e) => warn!(
                "transfer_reconcile_failed: {} error={}, using local chunk state",
                task.id, e
            ),
        }
        let percent = task.record_progress();
        listener.on_progress(percent, &task.uploaded_list(), task.total_chunks);

        for index in task.pending_chunks() {
            self.send_chunk(task, &session_id, index, listener, abort)
                .await?;
        }
        check_abort(abort)?;

        self.recover_missing(task, &session_id, listener, abort)
            .await?;

        listener.on_finalizing();
        let result = self
            .service
            .finalize(&session_id, self.config.requester_id.as_deref())
            .await
            .map_err(UploadError::Finalization)?;
        info!(
            "transfer_complete: {} path={} duplicate={}",
            task.id, result.file_path, result.is_duplicate
        );
        Ok(result)
    }

    /// Authoritative chunk state of a session
    pub async fn fetch_chunk_state(&self, session_id: &str) -> Result<ChunkState, UploadError> {
        self.service
            .status(session_id)
            .await
            .map(ChunkState::from)
            .map_err(UploadError::Reconciliation)
    }

    /// Tell the server to drop a session. Fire-and-forget: failures are logged.
    pub fn release_session(&self, session_id: String) {
        let service = self.service.clone();
        tokio::spawn(async move {
            match service.cancel(&session_id).await {
                Ok(()) => debug!("transfer_release: {}", session_id),
                Err(e) => warn!("transfer_release_failed: {} error={}", session_id, e),
            }
        });
    }

    /// Second pass: upload whatever the server still reports missing
    async fn recover_missing(
        &self,
        task: &mut UploadTask,
        session_id: &str,
        listener: &dyn TransferListener,
        abort: &AbortSignal,
    ) -> Result<(), UploadError> {
        let state = match self.fetch_chunk_state(session_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("transfer_verify_failed: {} error={}", task.id, e);
                return Ok(());
            }
        };

        let mut missing: Vec<u32> = state
            .missing_chunk_indices
            .into_iter()
            .filter(|i| *i < state.total_chunks)
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }

        warn!(
            "transfer_verify: {} server still missing {} chunks {:?}",
            task.id,
            missing.len(),
            missing
        );
        for index in missing {
            task.uploaded_chunks.remove(&index);
            self.send_chunk(task, session_id, index, listener, abort)
                .await?;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.config.settle_delay()) => {}
            reason = abort.aborted() => return Err(UploadError::Aborted(reason)),
        }
        Ok(())
    }

    async fn send_chunk(
        &self,
        task: &mut UploadTask,
        session_id: &str,
        index: u32,
        listener: &dyn TransferListener,
        abort: &AbortSignal,
    ) -> Result<(), UploadError> {
        check_abort(abort)?;
        let (start, end) = self.chunk_range(index, task.size);
        let bytes = task
            .source
            .read_range(start, end)
            .await
            .map_err(|source| UploadError::Source { index, source })?;

        self.upload_with_retry(&task.id, session_id, index, bytes, abort)
            .await?;

        task.uploaded_chunks.insert(index);
        let percent = task.record_progress();
        listener.on_progress(percent, &task.uploaded_list(), task.total_chunks);
        Ok(())
    }

    /// One initial attempt plus `max_retries` retries with exponential backoff
    async fn upload_with_retry(
        &self,
        task_id: &str,
        session_id: &str,
        index: u32,
        bytes: Vec<u8>,
        abort: &AbortSignal,
    ) -> Result<ChunkReceipt, UploadError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempts = 0;
        loop {
            check_abort(abort)?;
            let err = match self
                .service
                .upload_chunk(session_id, index, bytes.clone())
                .await
            {
                Ok(receipt) => return Ok(receipt),
                Err(err) => err,
            };
            attempts += 1;
            check_abort(abort)?;

            if attempts >= max_attempts {
                error!(
                    "chunk_failed: {} chunk={} attempts={} error={}",
                    task_id, index, attempts, err
                );
                return Err(UploadError::TerminalChunk {
                    index,
                    attempts,
                    source: err,
                });
            }

            let delay = self.config.retry_delay(attempts - 1);
            warn!(
                "chunk_retry: {} chunk={} attempt={}/{} delay={:?} error={}",
                task_id, index, attempts, max_attempts, delay, err
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                reason = abort.aborted() => return Err(UploadError::Aborted(reason)),
            }
        }
    }
}
