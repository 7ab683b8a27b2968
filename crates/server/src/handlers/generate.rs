//! Image generation endpoint.

use crate::admission::AdmittedClient;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use atelier_core::GenerationParams;
use atelier_metadata::repos::StylePresetRepo;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Generation request body.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
    pub steps: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub style_preset_id: Option<Uuid>,
}

/// Successful generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub id: Uuid,
    pub image_url: String,
    pub seed: i64,
    pub message: &'static str,
}

/// Public URL of a stored image.
pub fn image_url(file_path: &str) -> String {
    format!("/files/{file_path}")
}

/// POST /api/generate - Generate an image. Runs behind admission control.
#[tracing::instrument(skip(state, admitted, body), fields(client = %admitted.client_id))]
pub async fn generate_image(
    State(state): State<AppState>,
    Extension(admitted): Extension<AdmittedClient>,
    Json(body): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let params = GenerationParams::from_request(
        body.prompt,
        body.negative_prompt,
        body.seed,
        body.steps,
        body.width,
        body.height,
        body.style_preset_id,
    )?;

    let affixes = match params.style_preset_id {
        Some(preset_id) => {
            let preset = state
                .metadata
                .get_enabled_style_preset(preset_id)
                .await?
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("Unknown style preset: {preset_id}"))
                })?;
            Some(preset.affixes())
        }
        None => None,
    };

    let started = Instant::now();
    let outcome = state.orchestrator.generate(&params, affixes.as_ref()).await;

    match outcome.result {
        Ok(image) => {
            let row = state
                .recorder
                .record_success(&params, outcome.seed, outcome.payload, image)
                .await
                .map_err(ApiError::SaveFailed)?;
            state
                .recorder
                .record_elapsed(row.generation_id, started.elapsed())
                .await;

            tracing::info!(
                generation_id = %row.generation_id,
                seed = outcome.seed,
                privileged = admitted.privileged,
                "Image generated"
            );
            let file_path = row.file_path.unwrap_or_default();
            Ok(Json(GenerateResponse {
                id: row.generation_id,
                image_url: image_url(&file_path),
                seed: outcome.seed,
                message: "Image generated successfully",
            }))
        }
        Err(e) => {
            let details = e.to_string();
            tracing::warn!(seed = outcome.seed, error = %details, "Image generation failed");

            let row = state
                .recorder
                .record_failure(&params, outcome.seed, outcome.payload, &details)
                .await
                .map_err(ApiError::SaveFailed)?;
            state
                .recorder
                .record_elapsed(row.generation_id, started.elapsed())
                .await;

            Err(ApiError::GenerationFailed {
                id: row.generation_id,
                details,
            })
        }
    }
}
