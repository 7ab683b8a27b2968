//! Image store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// No image is stored under the key.
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key is not a safe relative path under the image root.
    #[error("invalid image key: {0}")]
    InvalidKey(String),

    #[error("image store misconfigured: {0}")]
    Config(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
