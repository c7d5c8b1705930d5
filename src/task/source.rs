//! Byte sources the engine reads chunk ranges from

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use super::types::{build_task_id, UploadTask};

/// Read-only access to the raw bytes of a file being uploaded
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read `[start, end)`
    async fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let len = end.saturating_sub(start) as usize;
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::from(data.into()),
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let len = self.data.len();
        let (start, end) = (start as usize, end as usize);
        if start > end || end > len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {}..{} outside of {} bytes", start, end, len),
            ));
        }
        Ok(self.data[start..end].to_vec())
    }
}

/// Guess a MIME type from the file extension
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// SHA-256 of the whole source, read one chunk at a time.
///
/// Optional: the server may use it to detect duplicates, transfer
/// semantics do not depend on it.
pub async fn content_digest(
    source: &dyn ByteSource,
    size: u64,
    chunk_size: u64,
) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let step = chunk_size.max(1);
    let mut offset = 0;
    while offset < size {
        let end = std::cmp::min(offset + step, size);
        hasher.update(source.read_range(offset, end).await?);
        offset = end;
    }
    Ok(hex::encode(hasher.finalize()))
}

impl UploadTask {
    /// Build a pending task for a file on disk
    pub async fn from_path(id: impl Into<String>, path: &Path, chunk_size: u64) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a file: {}", path.display()),
            ));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(UploadTask::new(
            id,
            filename,
            Arc::new(FileSource::new(path)),
            metadata.len(),
            guess_mime_type(path),
            chunk_size,
        ))
    }

    /// Build one task per path, each with a fresh id
    pub async fn from_paths(paths: &[PathBuf], chunk_size: u64) -> io::Result<Vec<Self>> {
        let mut tasks = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown");
            let id = build_task_id(filename, index);
            tasks.push(Self::from_path(id, path, chunk_size).await?);
        }
        Ok(tasks)
    }
}
