//! Upload task model
//!
//! - `types`: task, status and update events
//! - `source`: byte sources and the optional content digest
//! - `validation`: media type / size / batch checks
//! - `format`: size and duration formatting

mod format;
mod source;
mod types;
mod validation;

pub use format::{format_duration, format_file_size};
pub use source::{content_digest, guess_mime_type, ByteSource, FileSource, MemorySource};
pub use types::{build_task_id, chunk_count, TaskEvent, UploadStatus, UploadTask};
pub use validation::{
    validate_batch, validate_media, ValidationError, ALLOWED_MIME_TYPES, MAX_FILES,
    MAX_FILE_SIZE,
};
