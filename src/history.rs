//! Upload history - terminal records of finished uploads
//!
//! The queue emits one entry per task that completes or fails; the caller
//! decides where the list lives. [`UploadHistory`] keeps the most recent
//! entries first and can persist them as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::Path;

use crate::api::FinalizeResult;
use crate::task::UploadTask;

/// Entries kept in the history ring
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub status: HistoryStatus,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub is_duplicate: bool,
}

impl HistoryEntry {
    pub fn completed(task: &UploadTask, result: &FinalizeResult, at: DateTime<Utc>) -> Self {
        Self {
            file_path: Some(result.file_path.clone()),
            is_duplicate: result.is_duplicate,
            ..Self::base(task, HistoryStatus::Completed, at)
        }
    }

    pub fn failed(task: &UploadTask, at: DateTime<Utc>) -> Self {
        Self::base(task, HistoryStatus::Failed, at)
    }

    fn base(task: &UploadTask, status: HistoryStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: task.id.clone(),
            filename: task.filename.clone(),
            size: task.size,
            mime_type: task.mime_type.clone(),
            status,
            timestamp: at,
            duration_ms: (at - task.started_at - task.paused_duration)
                .num_milliseconds()
                .max(0),
            file_path: None,
            is_duplicate: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct UploadHistory {
    entries: VecDeque<HistoryEntry>,
}

impl UploadHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry at the front, dropping the oldest past capacity
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub async fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await
    }

    /// Load a saved history; a missing file is an empty history
    pub async fn load(path: &Path) -> io::Result<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        let mut history: UploadHistory = serde_json::from_slice(&raw)?;
        history.entries.truncate(HISTORY_CAPACITY);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: usize) -> HistoryEntry {
        HistoryEntry {
            id: format!("task-{}", id),
            filename: format!("file-{}.png", id),
            size: 10,
            mime_type: "image/png".into(),
            status: HistoryStatus::Completed,
            timestamp: Utc::now(),
            duration_ms: 5,
            file_path: None,
            is_duplicate: false,
        }
    }

    #[test]
    fn keeps_most_recent_hundred_first() {
        let mut history = UploadHistory::new();
        for i in 0..105 {
            history.push(entry(i));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.entries().next().unwrap().id, "task-104");
        assert_eq!(history.entries().last().unwrap().id, "task-5");
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("history.json");

        let mut history = UploadHistory::new();
        history.push(entry(1));
        history.push(entry(2));
        history.save(&path).await.unwrap();

        let loaded = UploadHistory::load(&path).await.unwrap();
        assert_eq!(loaded, history);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = UploadHistory::load(&dir.path().join("none.json")).await.unwrap();
        assert!(loaded.is_empty());
    }
}
