//! Upload admission checks: media type, file size and batch size

use thiserror::Error;

use super::format::format_file_size;

/// Largest accepted file: 500 MiB
pub const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Files allowed in the upload list at once
pub const MAX_FILES: usize = 10;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/mpeg",
    "video/quicktime",
    "video/webm",
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid file type. Only images and videos are allowed.")]
    UnsupportedType(String),

    #[error("File size exceeds {}", format_file_size(*.max))]
    TooLarge { size: u64, max: u64 },

    #[error("Maximum {max} files allowed")]
    TooManyFiles { max: usize },
}

pub fn validate_media(mime_type: &str, size: u64, max_size: u64) -> Result<(), ValidationError> {
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(ValidationError::UnsupportedType(mime_type.to_string()));
    }
    if size > max_size {
        return Err(ValidationError::TooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

pub fn validate_batch(existing: usize, incoming: usize) -> Result<(), ValidationError> {
    if existing + incoming > MAX_FILES {
        return Err(ValidationError::TooManyFiles { max: MAX_FILES });
    }
    Ok(())
}
