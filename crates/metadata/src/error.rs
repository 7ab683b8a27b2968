//! Metadata store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key (generation ID or preset name) is already taken.
    #[error("duplicate record: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata store misconfigured: {0}")]
    Config(String),

    /// Any other constraint the schema enforces, e.g. a CHECK on `status`.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
