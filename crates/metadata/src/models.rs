//! Database models mapping to the metadata schema.

use atelier_core::{GenerationStatus, PromptAffixes};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Generation records
// =============================================================================

/// One generation attempt.
///
/// `file_*` columns are set only for successful attempts and
/// `error_message` only for failed ones; the schema enforces both.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub generation_id: Uuid,
    pub prompt: String,
    pub negative_prompt: String,
    /// Resolved seed actually sent to the provider.
    pub seed: i64,
    pub steps: i64,
    pub width: i64,
    pub height: i64,
    pub style_preset_id: Option<Uuid>,
    /// Serialized payload sent to the provider.
    pub original_payload: Option<String>,
    /// Path relative to the image root, e.g. `2025/06/novelai_20250601_120000_42.png`.
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub generation_time_ms: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl GenerationRow {
    /// Parse the stored status.
    pub fn status(&self) -> atelier_core::Result<GenerationStatus> {
        self.status.parse()
    }
}

// =============================================================================
// Style presets
// =============================================================================

/// Named prompt decoration.
#[derive(Debug, Clone, FromRow)]
pub struct StylePresetRow {
    pub preset_id: Uuid,
    pub name: String,
    pub description: String,
    pub prefix_prompt: String,
    pub suffix_prompt: String,
    pub prefix_negative_prompt: String,
    pub suffix_negative_prompt: String,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl StylePresetRow {
    /// Prompt affixes this preset applies.
    pub fn affixes(&self) -> PromptAffixes {
        PromptAffixes {
            prefix_prompt: self.prefix_prompt.clone(),
            suffix_prompt: self.suffix_prompt.clone(),
            prefix_negative_prompt: self.prefix_negative_prompt.clone(),
            suffix_negative_prompt: self.suffix_negative_prompt.clone(),
        }
    }
}
