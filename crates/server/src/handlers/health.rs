//! Health check endpoint.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health - Check both stores.
///
/// Intentionally unauthenticated and outside admission control so load
/// balancers can poll it.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let result = match state.metadata.health_check().await {
        Ok(()) => state
            .storage
            .health_check()
            .await
            .map_err(|e| format!("storage: {e}")),
        Err(e) => Err(format!("metadata: {e}")),
    };

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                error: None,
            }),
        ),
        Err(error) => {
            tracing::warn!(error = %error, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    version: env!("CARGO_PKG_VERSION"),
                    error: Some(error),
                }),
            )
        }
    }
}
