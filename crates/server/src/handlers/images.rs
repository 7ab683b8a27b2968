//! Generation record lookup endpoints.

use super::generate::image_url;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use atelier_metadata::models::GenerationRow;
use atelier_metadata::repos::GenerationRepo;
use atelier_metadata::repos::generations::MAX_BATCH_IDS;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Public view of a generation record.
#[derive(Debug, Serialize)]
pub struct GenerationView {
    pub id: Uuid,
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub steps: i64,
    pub width: i64,
    pub height: i64,
    pub style_preset_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub generation_time_ms: Option<i64>,
    pub created_at: String,
}

impl From<GenerationRow> for GenerationView {
    fn from(row: GenerationRow) -> Self {
        Self {
            id: row.generation_id,
            prompt: row.prompt,
            negative_prompt: row.negative_prompt,
            seed: row.seed,
            steps: row.steps,
            width: row.width,
            height: row.height,
            style_preset_id: row.style_preset_id,
            image_url: row.file_path.as_deref().map(image_url),
            status: row.status,
            error_message: row.error_message,
            generation_time_ms: row.generation_time_ms,
            created_at: row.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid image ID: {raw}")))
}

/// GET /api/images/{id}
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationView>> {
    let id = parse_id(&id)?;
    let row = state
        .metadata
        .get_generation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;
    Ok(Json(row.into()))
}

/// Batch lookup request body.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Batch lookup response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub images: Vec<GenerationView>,
}

/// POST /api/images/batch - Look up to 50 records, newest first.
pub async fn get_images_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    if body.ids.is_empty() {
        return Err(ApiError::BadRequest("IDs cannot be empty".to_string()));
    }
    if body.ids.len() > MAX_BATCH_IDS {
        return Err(ApiError::BadRequest(format!(
            "Too many IDs, maximum {MAX_BATCH_IDS}"
        )));
    }

    let ids = body
        .ids
        .iter()
        .map(|raw| parse_id(raw))
        .collect::<ApiResult<Vec<_>>>()?;

    let rows = state.metadata.get_generations_batch(&ids).await?;
    Ok(Json(BatchResponse {
        images: rows.into_iter().map(GenerationView::from).collect(),
    }))
}
