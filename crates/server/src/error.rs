//! API error types.

use crate::recorder::RecordError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Record of the failed attempt, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] atelier_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] atelier_metadata::MetadataError),

    #[error("{0}")]
    Validation(#[from] atelier_core::Error),

    /// The provider call failed and the attempt was recorded.
    #[error("Failed to generate image")]
    GenerationFailed { id: Uuid, details: String },

    /// The outcome could not be persisted.
    #[error("Failed to save image")]
    SaveFailed(#[source] RecordError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) | Self::Validation(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Storage(e) => match e {
                atelier_storage::StorageError::NotFound(_) => "NOT_FOUND",
                atelier_storage::StorageError::InvalidKey(_) => "BAD_REQUEST",
                _ => "STORAGE_ERROR",
            },
            Self::Metadata(e) => match e {
                atelier_metadata::MetadataError::NotFound(_) => "NOT_FOUND",
                _ => "METADATA_ERROR",
            },
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
            Self::SaveFailed(_) => "STORAGE_ERROR",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                atelier_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                atelier_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                atelier_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::GenerationFailed { .. } | Self::SaveFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = ?self, "Request failed");
        }

        let (details, id) = match &self {
            Self::GenerationFailed { id, details } => (Some(details.clone()), Some(*id)),
            _ => (None, None),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            details,
            id,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
