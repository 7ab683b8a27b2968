//! Stored image serving.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};

/// GET /files/{*path} - Serve a stored image.
///
/// Images are never rewritten under the same key, so they can be cached
/// indefinitely.
pub async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let data = state.storage.get(&path).await?;
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "image/png".to_string()),
            (CONTENT_LENGTH, data.len().to_string()),
            (CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        data,
    )
        .into_response())
}
