//! Style preset repository.

use crate::error::MetadataResult;
use crate::models::StylePresetRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for style presets.
#[async_trait]
pub trait StylePresetRepo: Send + Sync {
    /// Insert a preset, or update the preset with the same name.
    ///
    /// An existing preset keeps its ID and creation time. Returns the stored row.
    async fn upsert_style_preset(&self, preset: &StylePresetRow) -> MetadataResult<StylePresetRow>;

    /// List enabled presets, oldest first.
    async fn list_enabled_style_presets(&self) -> MetadataResult<Vec<StylePresetRow>>;

    /// Get a preset by ID if it exists and is enabled.
    async fn get_enabled_style_preset(
        &self,
        preset_id: Uuid,
    ) -> MetadataResult<Option<StylePresetRow>>;
}
