//! Style preset listing.

use crate::error::ApiResult;
use crate::state::AppState;
use atelier_metadata::models::StylePresetRow;
use atelier_metadata::repos::StylePresetRepo;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StylePresetView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prefix_prompt: String,
    pub suffix_prompt: String,
    pub prefix_negative_prompt: String,
    pub suffix_negative_prompt: String,
}

impl From<StylePresetRow> for StylePresetView {
    fn from(row: StylePresetRow) -> Self {
        Self {
            id: row.preset_id,
            name: row.name,
            description: row.description,
            prefix_prompt: row.prefix_prompt,
            suffix_prompt: row.suffix_prompt,
            prefix_negative_prompt: row.prefix_negative_prompt,
            suffix_negative_prompt: row.suffix_negative_prompt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StylePresetsResponse {
    pub presets: Vec<StylePresetView>,
}

/// GET /api/style-presets - Enabled presets, oldest first.
pub async fn list_style_presets(
    State(state): State<AppState>,
) -> ApiResult<Json<StylePresetsResponse>> {
    let presets = state.metadata.list_enabled_style_presets().await?;
    Ok(Json(StylePresetsResponse {
        presets: presets.into_iter().map(StylePresetView::from).collect(),
    }))
}
