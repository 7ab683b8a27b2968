//! Style preset seeding.

use anyhow::{Result, bail};
use atelier_core::config::StylePresetConfig;
use atelier_metadata::MetadataStore;
use atelier_metadata::models::StylePresetRow;
use atelier_metadata::repos::StylePresetRepo;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upsert the configured style presets by name.
///
/// Running this on every start is safe: existing presets keep their ID and
/// creation time and take the configured text and `enabled` flag. Presets
/// that are no longer configured are left alone.
pub async fn seed_style_presets(
    metadata: &dyn MetadataStore,
    presets: &[StylePresetConfig],
) -> Result<usize> {
    let now = OffsetDateTime::now_utc();
    for preset in presets {
        let name = preset.name.trim();
        if name.is_empty() {
            bail!("style preset name must not be empty");
        }

        let row = StylePresetRow {
            preset_id: Uuid::new_v4(),
            name: name.to_string(),
            description: preset.description.clone(),
            prefix_prompt: preset.prefix_prompt.clone(),
            suffix_prompt: preset.suffix_prompt.clone(),
            prefix_negative_prompt: preset.prefix_negative_prompt.clone(),
            suffix_negative_prompt: preset.suffix_negative_prompt.clone(),
            enabled: preset.enabled,
            created_at: now,
            updated_at: now,
        };
        let stored = metadata.upsert_style_preset(&row).await?;
        tracing::debug!(preset_id = %stored.preset_id, name = %stored.name, "Style preset seeded");
    }

    if !presets.is_empty() {
        tracing::info!(count = presets.len(), "Style presets seeded");
    }
    Ok(presets.len())
}
