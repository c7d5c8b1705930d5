#![allow(dead_code)]

use async_trait::async_trait;
use chunked_uploader::api::{
    ChunkReceipt, FinalizeResult, HealthStatus, InitiateRequest, MonitoringStats, ServiceResult,
    SessionStatus, StorageStats, UploadMetrics, UploadService,
};
use chunked_uploader::config::TransferConfig;
use chunked_uploader::error::ServiceError;
use chunked_uploader::history::HistoryEntry;
use chunked_uploader::queue::{TaskObserver, UploadQueue};
use chunked_uploader::store::UploadStore;
use chunked_uploader::task::{MemorySource, TaskEvent, UploadStatus, UploadTask};
use chunked_uploader::transfer::TransferListener;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const CHUNK_SIZE: u64 = 4;

pub fn session_for(filename: &str) -> String {
    format!("session-{}", filename)
}

pub fn memory_task(id: &str, size: u64) -> UploadTask {
    let data: Vec<u8> = (0..size).map(|b| b as u8).collect();
    UploadTask::new(
        id,
        id,
        Arc::new(MemorySource::new(data)),
        size,
        "video/mp4",
        CHUNK_SIZE,
    )
}

/// Small chunks and short delays; backoff keeps the 1:2:4 shape
pub fn fast_transfer_config() -> TransferConfig {
    TransferConfig {
        chunk_size: CHUNK_SIZE,
        max_retries: 3,
        retry_base_delay_ms: 10,
        settle_delay_ms: 5,
        requester_id: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkUpload {
    pub session_id: String,
    pub index: u32,
    pub len: usize,
}

#[derive(Debug, Default)]
struct Session {
    filename: String,
    size: u64,
    total_chunks: u32,
    received: BTreeSet<u32>,
}

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, Session>,
    gates: HashMap<String, Arc<Semaphore>>,
    /// (call, session) -> gate, call being "status" or "finalize"
    session_gates: HashMap<(&'static str, String), Arc<Semaphore>>,
    /// (filename, chunk) -> failures left; `None` fails forever
    chunk_failures: HashMap<(String, u32), Option<u32>>,
    lost_once: HashSet<(String, u32)>,
    initiate_failures: HashSet<String>,
    status_failures: HashSet<String>,
    finalize_failures: HashSet<String>,
    status_calls: Vec<String>,
    initiate_calls: Vec<String>,
    attempts: Vec<(String, u32)>,
    uploads: Vec<ChunkUpload>,
    finalize_calls: Vec<(String, Option<String>)>,
    cancel_calls: Vec<String>,
}

/// Scripted in-memory upload service. Sessions are named after the file.
#[derive(Default)]
pub struct MockUploadService {
    state: Mutex<MockState>,
}

impl MockUploadService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Open a session up front with some chunks already received
    pub fn preset_session(&self, filename: &str, size: u64, total_chunks: u32, received: &[u32]) {
        self.lock().sessions.insert(
            session_for(filename),
            Session {
                filename: filename.to_string(),
                size,
                total_chunks,
                received: received.iter().copied().collect(),
            },
        );
    }

    /// Hold chunk uploads of `filename` until permits are released
    pub fn close_gate(&self, filename: &str) {
        self.lock()
            .gates
            .insert(filename.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, filename: &str, permits: usize) {
        if let Some(gate) = self.lock().gates.get(filename) {
            gate.add_permits(permits);
        }
    }

    pub fn open_gate(&self, filename: &str) {
        self.release(filename, 10_000);
    }

    pub fn fail_chunk(&self, filename: &str, index: u32, times: Option<u32>) {
        self.lock()
            .chunk_failures
            .insert((filename.to_string(), index), times);
    }

    /// Accept the chunk once without storing it
    pub fn lose_chunk_once(&self, filename: &str, index: u32) {
        self.lock().lost_once.insert((filename.to_string(), index));
    }

    pub fn fail_initiate(&self, filename: &str) {
        self.lock().initiate_failures.insert(filename.to_string());
    }

    pub fn fail_status(&self, session_id: &str) {
        self.lock().status_failures.insert(session_id.to_string());
    }

    pub fn fail_finalize(&self, session_id: &str) {
        self.lock().finalize_failures.insert(session_id.to_string());
    }

    /// Hold status calls for `session_id` until `unhold`
    pub fn hold_status(&self, session_id: &str) {
        self.hold("status", session_id);
    }

    /// Hold finalize calls for `session_id` until `unhold`
    pub fn hold_finalize(&self, session_id: &str) {
        self.hold("finalize", session_id);
    }

    fn hold(&self, call: &'static str, session_id: &str) {
        self.lock()
            .session_gates
            .insert((call, session_id.to_string()), Arc::new(Semaphore::new(0)));
    }

    pub fn unhold(&self, session_id: &str) {
        let state = self.lock();
        for ((_, session), gate) in state.session_gates.iter() {
            if session == session_id {
                gate.add_permits(10_000);
            }
        }
    }

    async fn pass_gate(&self, call: &'static str, session_id: &str) {
        let gate = self
            .lock()
            .session_gates
            .get(&(call, session_id.to_string()))
            .cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.lock().status_calls.clone()
    }

    pub fn initiate_calls(&self) -> Vec<String> {
        self.lock().initiate_calls.clone()
    }

    pub fn attempts_for(&self, session_id: &str, index: u32) -> usize {
        self.lock()
            .attempts
            .iter()
            .filter(|(s, i)| s == session_id && *i == index)
            .count()
    }

    pub fn total_attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn uploads(&self) -> Vec<ChunkUpload> {
        self.lock().uploads.clone()
    }

    pub fn upload_order(&self, session_id: &str) -> Vec<u32> {
        self.lock()
            .uploads
            .iter()
            .filter(|u| u.session_id == session_id)
            .map(|u| u.index)
            .collect()
    }

    pub fn finalize_calls(&self) -> Vec<(String, Option<String>)> {
        self.lock().finalize_calls.clone()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.lock().cancel_calls.clone()
    }
}

fn unavailable() -> ServiceError {
    ServiceError::Http {
        status: 503,
        message: Some("Chunk store unavailable".to_string()),
    }
}

fn not_found() -> ServiceError {
    ServiceError::Http {
        status: 404,
        message: Some("Upload not found".to_string()),
    }
}

#[async_trait]
impl UploadService for MockUploadService {
    async fn initiate(&self, request: &InitiateRequest) -> ServiceResult<String> {
        let mut state = self.lock();
        state.initiate_calls.push(request.filename.clone());
        if state.initiate_failures.contains(&request.filename) {
            return Err(ServiceError::Http {
                status: 400,
                message: Some("File type not allowed".to_string()),
            });
        }
        let session_id = session_for(&request.filename);
        state.sessions.insert(
            session_id.clone(),
            Session {
                filename: request.filename.clone(),
                size: request.file_size,
                total_chunks: request.total_chunks,
                received: BTreeSet::new(),
            },
        );
        Ok(session_id)
    }

    async fn upload_chunk(
        &self,
        session_id: &str,
        chunk_index: u32,
        bytes: Vec<u8>,
    ) -> ServiceResult<ChunkReceipt> {
        let gate = {
            let state = self.lock();
            let filename = state.sessions.get(session_id).map(|s| s.filename.clone());
            filename.and_then(|f| state.gates.get(&f).cloned())
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut state = self.lock();
        state.attempts.push((session_id.to_string(), chunk_index));
        let filename = match state.sessions.get(session_id) {
            Some(session) => session.filename.clone(),
            None => return Err(not_found()),
        };

        let key = (filename, chunk_index);
        match state.chunk_failures.get_mut(&key) {
            Some(None) => return Err(unavailable()),
            Some(Some(left)) if *left > 0 => {
                *left -= 1;
                return Err(unavailable());
            }
            _ => {}
        }

        state.uploads.push(ChunkUpload {
            session_id: session_id.to_string(),
            index: chunk_index,
            len: bytes.len(),
        });
        let lost = state.lost_once.remove(&key);
        let session = state.sessions.get_mut(session_id).unwrap();
        if !lost {
            session.received.insert(chunk_index);
        }
        Ok(ChunkReceipt {
            progress_percent: session.received.len() as f64 * 100.0
                / session.total_chunks.max(1) as f64,
            uploaded_count: session.received.len() as u32,
            total_chunks: session.total_chunks,
        })
    }

    async fn status(&self, session_id: &str) -> ServiceResult<SessionStatus> {
        self.lock().status_calls.push(session_id.to_string());
        self.pass_gate("status", session_id).await;
        let state = self.lock();
        if state.status_failures.contains(session_id) {
            return Err(unavailable());
        }
        let session = state.sessions.get(session_id).ok_or_else(not_found)?;
        let missing: Vec<u32> = (0..session.total_chunks)
            .filter(|i| !session.received.contains(i))
            .collect();
        Ok(SessionStatus {
            upload_id: session_id.to_string(),
            total_chunks: session.total_chunks,
            uploaded_chunks: session.received.len() as u32,
            missing_chunk_indices: missing,
            progress_percent: session.received.len() as f64 * 100.0
                / session.total_chunks.max(1) as f64,
            status: "uploading".to_string(),
        })
    }

    async fn finalize(
        &self,
        session_id: &str,
        requester_id: Option<&str>,
    ) -> ServiceResult<FinalizeResult> {
        self.lock()
            .finalize_calls
            .push((session_id.to_string(), requester_id.map(str::to_string)));
        self.pass_gate("finalize", session_id).await;
        let state = self.lock();
        if state.finalize_failures.contains(session_id) {
            return Err(unavailable());
        }
        let session = state.sessions.get(session_id).ok_or_else(not_found)?;
        if session.received.len() as u32 != session.total_chunks {
            return Err(ServiceError::Http {
                status: 400,
                message: Some("Missing chunks".to_string()),
            });
        }
        Ok(FinalizeResult {
            message: "Upload completed successfully".to_string(),
            file_path: format!("/media/{}", session.filename),
            filename: session.filename.clone(),
            size: session.size,
            content_hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            is_duplicate: false,
        })
    }

    async fn cancel(&self, session_id: &str) -> ServiceResult<()> {
        let mut state = self.lock();
        state.cancel_calls.push(session_id.to_string());
        state.sessions.remove(session_id);
        Ok(())
    }

    async fn monitoring_stats(&self) -> ServiceResult<MonitoringStats> {
        let state = self.lock();
        Ok(MonitoringStats {
            storage: StorageStats {
                total_size: 0,
                total_size_mb: 0.0,
                file_count: 0,
            },
            active_uploads: state.sessions.len() as u64,
            upload_details: Vec::new(),
            metrics: UploadMetrics {
                total_uploads: 0,
                successful_uploads: 0,
                success_rate: 0.0,
            },
        })
    }

    async fn health(&self) -> ServiceResult<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            services: HashMap::new(),
        })
    }
}

/// Listener that keeps every progress report
#[derive(Default)]
pub struct RecordingListener {
    pub sessions: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(f64, Vec<u32>)>>,
    pub finalizing: Mutex<usize>,
}

impl RecordingListener {
    pub fn percents(&self) -> Vec<f64> {
        self.progress.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }
}

impl TransferListener for RecordingListener {
    fn on_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().push(session_id.to_string());
    }

    fn on_progress(&self, percent: f64, uploaded_chunks: &[u32], _total_chunks: u32) {
        self.progress
            .lock()
            .unwrap()
            .push((percent, uploaded_chunks.to_vec()));
    }

    fn on_finalizing(&self) {
        *self.finalizing.lock().unwrap() += 1;
    }
}

/// Observer that logs every event and keeps a store current
#[derive(Default)]
pub struct RecordingObserver {
    pub store: UploadStore,
    events: Mutex<Vec<(String, TaskEvent)>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, TaskEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn statuses_for(&self, task_id: &str) -> Vec<UploadStatus> {
        self.events_for(task_id)
            .iter()
            .filter_map(TaskEvent::status)
            .collect()
    }

    pub fn started(&self, task_id: &str) -> bool {
        self.events_for(task_id).contains(&TaskEvent::Started)
    }

    pub fn status_of(&self, task_id: &str) -> Option<UploadStatus> {
        self.store.get(task_id).map(|t| t.status)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().unwrap().clone()
    }

    /// Largest number of tasks between `Started` and a terminal or paused event
    pub fn max_running(&self) -> usize {
        let mut running = HashSet::new();
        let mut max = 0;
        for (id, event) in self.events() {
            match event {
                TaskEvent::Started => {
                    running.insert(id);
                }
                TaskEvent::Completed { .. } | TaskEvent::Failed { .. } | TaskEvent::Paused { .. } => {
                    running.remove(&id);
                }
                _ => {}
            }
            max = max.max(running.len());
        }
        max
    }
}

impl TaskObserver for RecordingObserver {
    fn on_task_event(&self, task_id: &str, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap()
            .push((task_id.to_string(), event.clone()));
        self.store.on_task_event(task_id, event);
    }

    fn on_history(&self, entry: HistoryEntry) {
        self.history.lock().unwrap().push(entry.clone());
        self.store.on_history(entry);
    }
}

/// Poll `check` until it holds; panics after a generous number of rounds
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..2_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_active(queue: &UploadQueue, expected: usize) {
    for _ in 0..2_000 {
        if queue.active_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {} active uploads", expected);
}

/// Let spawned work run without advancing much time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}
