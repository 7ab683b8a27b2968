//! Generation record repository.

use crate::error::MetadataResult;
use crate::models::GenerationRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum number of IDs accepted by a single batch lookup.
pub const MAX_BATCH_IDS: usize = 50;

/// Repository for generation records.
#[async_trait]
pub trait GenerationRepo: Send + Sync {
    /// Insert a new generation record.
    async fn create_generation(&self, generation: &GenerationRow) -> MetadataResult<()>;

    /// Get a generation record by ID.
    async fn get_generation(&self, generation_id: Uuid) -> MetadataResult<Option<GenerationRow>>;

    /// Get several generation records, newest first.
    /// Unknown IDs are skipped.
    async fn get_generations_batch(
        &self,
        generation_ids: &[Uuid],
    ) -> MetadataResult<Vec<GenerationRow>>;

    /// Attach the measured generation time to a record.
    /// Returns `NotFound` if the record does not exist.
    async fn update_generation_time(
        &self,
        generation_id: Uuid,
        generation_time_ms: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
