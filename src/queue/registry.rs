use std::collections::HashMap;

use crate::transfer::AbortSignal;

/// One admitted transfer run
#[derive(Debug, Clone)]
pub(crate) struct ActiveUpload {
    pub run_id: u64,
    pub abort: AbortSignal,
}

/// Tasks currently holding a concurrency slot, owned by the queue worker.
/// A task id appears at most once.
#[derive(Debug, Default)]
pub(crate) struct ActiveRegistry {
    uploads: HashMap<String, ActiveUpload>,
}

impl ActiveRegistry {
    /// Register a run and hand back the signal that stops it
    pub fn insert(&mut self, task_id: &str, run_id: u64) -> AbortSignal {
        let abort = AbortSignal::new();
        self.uploads.insert(
            task_id.to_string(),
            ActiveUpload {
                run_id,
                abort: abort.clone(),
            },
        );
        abort
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.uploads.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&ActiveUpload> {
        self.uploads.get(task_id)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<ActiveUpload> {
        self.uploads.remove(task_id)
    }

    /// Remove only if `run_id` is still the registered run
    pub fn remove_run(&mut self, task_id: &str, run_id: u64) -> Option<ActiveUpload> {
        match self.uploads.get(task_id) {
            Some(upload) if upload.run_id == run_id => self.uploads.remove(task_id),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.uploads.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (String, ActiveUpload)> + '_ {
        self.uploads.drain()
    }
}
