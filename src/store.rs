//! In-memory task list and history, kept current from queue events

use std::sync::{Mutex, MutexGuard};

use crate::history::{HistoryEntry, UploadHistory};
use crate::queue::TaskObserver;
use crate::task::{TaskEvent, UploadTask};

#[derive(Default)]
struct StoreState {
    tasks: Vec<UploadTask>,
    history: UploadHistory,
}

/// Caller-side store: pass it to the queue as its observer and read the
/// current tasks back from it.
#[derive(Default)]
pub struct UploadStore {
    state: Mutex<StoreState>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: UploadHistory) -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: Vec::new(),
                history,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append tasks, skipping ids already present
    pub fn add_tasks(&self, tasks: &[UploadTask]) {
        let mut state = self.lock();
        for task in tasks {
            if !state.tasks.iter().any(|t| t.id == task.id) {
                state.tasks.push(task.clone());
            }
        }
    }

    pub fn get(&self, task_id: &str) -> Option<UploadTask> {
        self.lock().tasks.iter().find(|t| t.id == task_id).cloned()
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.lock().tasks.clone()
    }

    pub fn remove(&self, task_id: &str) -> Option<UploadTask> {
        let mut state = self.lock();
        let position = state.tasks.iter().position(|t| t.id == task_id)?;
        Some(state.tasks.remove(position))
    }

    /// Drop completed and failed tasks from the list
    pub fn clear_finished(&self) -> usize {
        let mut state = self.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| !t.status.is_finished());
        before - state.tasks.len()
    }

    pub fn history(&self) -> UploadHistory {
        self.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }
}

impl TaskObserver for UploadStore {
    fn on_task_event(&self, task_id: &str, event: &TaskEvent) {
        let mut state = self.lock();
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
            task.apply(event);
        }
    }

    fn on_history(&self, entry: HistoryEntry) {
        self.lock().history.push(entry);
    }
}
