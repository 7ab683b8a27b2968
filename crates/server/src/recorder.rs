//! Durable recording of generation outcomes.
//!
//! Success writes the image file first and the metadata row second. If the
//! row cannot be written the file is deleted again, so a stored image always
//! has a record and a success record always has its image.

use crate::metrics;
use atelier_core::{GenerationParams, GenerationStatus};
use atelier_metadata::models::GenerationRow;
use atelier_metadata::repos::GenerationRepo;
use atelier_metadata::{MetadataError, MetadataStore};
use atelier_storage::{ObjectStore, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

/// Errors from persisting an outcome.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

/// Location of a stored image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageKey {
    /// Relative path under the image root, `YYYY/MM/<file_name>`.
    pub path: String,
    pub file_name: String,
}

impl ImageKey {
    /// Key for an image generated at `at` with `seed`.
    pub fn for_generation(at: OffsetDateTime, seed: i64) -> Self {
        let at = at.to_offset(time::UtcOffset::UTC);
        let stamp = at
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]"
            ))
            .unwrap_or_else(|_| at.unix_timestamp().to_string());
        let file_name = format!("novelai_{stamp}_{seed}.png");
        Self {
            path: format!("{:04}/{:02}/{file_name}", at.year(), u8::from(at.month())),
            file_name,
        }
    }

    /// Variant used when the plain key is already taken.
    fn disambiguated(&self) -> Self {
        let stem = self.file_name.trim_end_matches(".png");
        let file_name = format!("{stem}_{}.png", Uuid::new_v4().simple());
        let dir = self
            .path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();
        Self {
            path: format!("{dir}/{file_name}"),
            file_name,
        }
    }
}

/// Persists generation outcomes to the object store and metadata store.
pub struct OutcomeRecorder {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl OutcomeRecorder {
    pub fn new(storage: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    fn base_row(
        params: &GenerationParams,
        seed: i64,
        payload: Option<String>,
        status: GenerationStatus,
        now: OffsetDateTime,
    ) -> GenerationRow {
        GenerationRow {
            generation_id: Uuid::new_v4(),
            prompt: params.prompt.clone(),
            negative_prompt: params.negative_prompt.clone(),
            seed,
            steps: params.steps,
            width: params.width,
            height: params.height,
            style_preset_id: params.style_preset_id,
            original_payload: payload,
            file_path: None,
            file_name: None,
            file_size: None,
            status: status.as_str().to_string(),
            error_message: None,
            generation_time_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store the image, then its record. The file is removed if the record
    /// cannot be written.
    #[tracing::instrument(skip(self, params, payload, image), fields(size = image.len()))]
    pub async fn record_success(
        &self,
        params: &GenerationParams,
        seed: i64,
        payload: Option<String>,
        image: Bytes,
    ) -> Result<GenerationRow, RecordError> {
        let now = OffsetDateTime::now_utc();
        let size = image.len();

        let mut key = ImageKey::for_generation(now, seed);
        if !self.storage.put_if_not_exists(&key.path, image.clone()).await? {
            key = key.disambiguated();
            tracing::debug!(path = %key.path, "Image key taken, using disambiguated name");
            self.storage.put(&key.path, image).await?;
        }

        let mut row = Self::base_row(params, seed, payload, GenerationStatus::Success, now);
        row.file_path = Some(key.path.clone());
        row.file_name = Some(key.file_name);
        row.file_size = Some(size as i64);

        if let Err(e) = self.metadata.create_generation(&row).await {
            tracing::error!(
                generation_id = %row.generation_id,
                path = %key.path,
                error = %e,
                "Failed to record generation, removing stored image"
            );
            if let Err(cleanup) = self.storage.delete(&key.path).await {
                tracing::error!(
                    path = %key.path,
                    error = %cleanup,
                    "Failed to remove orphaned image"
                );
            }
            return Err(e.into());
        }

        metrics::GENERATIONS
            .with_label_values(&[GenerationStatus::Success.as_str()])
            .inc();
        metrics::IMAGE_BYTES.inc_by(size as u64);
        Ok(row)
    }

    /// Record a failed attempt. No file is written.
    #[tracing::instrument(skip(self, params, payload))]
    pub async fn record_failure(
        &self,
        params: &GenerationParams,
        seed: i64,
        payload: Option<String>,
        error_text: &str,
    ) -> Result<GenerationRow, RecordError> {
        let now = OffsetDateTime::now_utc();
        let mut row = Self::base_row(params, seed, payload, GenerationStatus::Failed, now);
        row.error_message = Some(if error_text.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error_text.to_string()
        });

        self.metadata.create_generation(&row).await?;
        metrics::GENERATIONS
            .with_label_values(&[GenerationStatus::Failed.as_str()])
            .inc();
        Ok(row)
    }

    /// Attach elapsed time to a record. Failures are logged, not returned.
    pub async fn record_elapsed(&self, generation_id: Uuid, elapsed: Duration) {
        let ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        if let Err(e) = self
            .metadata
            .update_generation_time(generation_id, ms, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(
                generation_id = %generation_id,
                error = %e,
                "Failed to record generation time"
            );
        }
    }
}
