//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{GenerationRepo, StylePresetRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: GenerationRepo + StylePresetRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers and keeps in-memory databases shared.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// SQLite cannot cancel statements, so slow queries are only reported.
    fn warn_if_slow(&self, operation: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "metadata query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Translate SQLite constraint failures into typed errors.
fn map_insert_error(err: sqlx::Error, what: &str) -> MetadataError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message();
            if msg.contains("UNIQUE constraint") {
                MetadataError::AlreadyExists(format!("{what}: {msg}"))
            } else if msg.contains("CHECK constraint") || msg.contains("NOT NULL constraint") {
                MetadataError::Constraint(format!("{what}: {msg}"))
            } else {
                sqlx::Error::Database(db_err).into()
            }
        }
        other => other.into(),
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl GenerationRepo for SqliteStore {
        async fn create_generation(&self, generation: &GenerationRow) -> MetadataResult<()> {
            let started = Instant::now();
            let result = sqlx::query(
                r#"
                INSERT INTO generations (
                    generation_id, prompt, negative_prompt, seed, steps, width, height,
                    style_preset_id, original_payload, file_path, file_name, file_size,
                    status, error_message, generation_time_ms, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(generation.generation_id)
            .bind(&generation.prompt)
            .bind(&generation.negative_prompt)
            .bind(generation.seed)
            .bind(generation.steps)
            .bind(generation.width)
            .bind(generation.height)
            .bind(generation.style_preset_id)
            .bind(&generation.original_payload)
            .bind(&generation.file_path)
            .bind(&generation.file_name)
            .bind(generation.file_size)
            .bind(&generation.status)
            .bind(&generation.error_message)
            .bind(generation.generation_time_ms)
            .bind(generation.created_at)
            .bind(generation.updated_at)
            .execute(&self.pool)
            .await;
            self.warn_if_slow("create_generation", started);

            result
                .map(|_| ())
                .map_err(|e| map_insert_error(e, "generation"))
        }

        async fn get_generation(
            &self,
            generation_id: Uuid,
        ) -> MetadataResult<Option<GenerationRow>> {
            let started = Instant::now();
            let row = sqlx::query_as::<_, GenerationRow>(
                "SELECT * FROM generations WHERE generation_id = ?",
            )
            .bind(generation_id)
            .fetch_optional(&self.pool)
            .await?;
            self.warn_if_slow("get_generation", started);
            Ok(row)
        }

        async fn get_generations_batch(
            &self,
            generation_ids: &[Uuid],
        ) -> MetadataResult<Vec<GenerationRow>> {
            if generation_ids.is_empty() {
                return Ok(Vec::new());
            }

            let placeholders: Vec<&str> = generation_ids.iter().map(|_| "?").collect();
            let query = format!(
                "SELECT * FROM generations WHERE generation_id IN ({}) \
                 ORDER BY created_at DESC, generation_id",
                placeholders.join(", ")
            );

            let started = Instant::now();
            let mut query_builder = sqlx::query_as::<_, GenerationRow>(&query);
            for id in generation_ids {
                query_builder = query_builder.bind(*id);
            }
            let rows = query_builder.fetch_all(&self.pool).await?;
            self.warn_if_slow("get_generations_batch", started);
            Ok(rows)
        }

        async fn update_generation_time(
            &self,
            generation_id: Uuid,
            generation_time_ms: i64,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let started = Instant::now();
            let result = sqlx::query(
                "UPDATE generations SET generation_time_ms = ?, updated_at = ? WHERE generation_id = ?",
            )
            .bind(generation_time_ms)
            .bind(updated_at)
            .bind(generation_id)
            .execute(&self.pool)
            .await?;
            self.warn_if_slow("update_generation_time", started);

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "generation {generation_id}"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StylePresetRepo for SqliteStore {
        async fn upsert_style_preset(
            &self,
            preset: &StylePresetRow,
        ) -> MetadataResult<StylePresetRow> {
            sqlx::query(
                r#"
                INSERT INTO style_presets (
                    preset_id, name, description, prefix_prompt, suffix_prompt,
                    prefix_negative_prompt, suffix_negative_prompt, enabled,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    prefix_prompt = excluded.prefix_prompt,
                    suffix_prompt = excluded.suffix_prompt,
                    prefix_negative_prompt = excluded.prefix_negative_prompt,
                    suffix_negative_prompt = excluded.suffix_negative_prompt,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(preset.preset_id)
            .bind(&preset.name)
            .bind(&preset.description)
            .bind(&preset.prefix_prompt)
            .bind(&preset.suffix_prompt)
            .bind(&preset.prefix_negative_prompt)
            .bind(&preset.suffix_negative_prompt)
            .bind(preset.enabled)
            .bind(preset.created_at)
            .bind(preset.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, "style preset"))?;

            let stored =
                sqlx::query_as::<_, StylePresetRow>("SELECT * FROM style_presets WHERE name = ?")
                    .bind(&preset.name)
                    .fetch_optional(&self.pool)
                    .await?;
            stored.ok_or_else(|| {
                MetadataError::Internal(format!("style preset '{}' vanished after upsert", preset.name))
            })
        }

        async fn list_enabled_style_presets(&self) -> MetadataResult<Vec<StylePresetRow>> {
            let rows = sqlx::query_as::<_, StylePresetRow>(
                "SELECT * FROM style_presets WHERE enabled = 1 ORDER BY created_at ASC, name ASC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_enabled_style_preset(
            &self,
            preset_id: Uuid,
        ) -> MetadataResult<Option<StylePresetRow>> {
            let row = sqlx::query_as::<_, StylePresetRow>(
                "SELECT * FROM style_presets WHERE preset_id = ? AND enabled = 1",
            )
            .bind(preset_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }
}

impl std::convert::From<std::io::Error> for crate::MetadataError {
    fn from(e: std::io::Error) -> Self {
        crate::MetadataError::Config(e.to_string())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Generation attempts, one row per call to the provider
CREATE TABLE IF NOT EXISTS generations (
    generation_id BLOB PRIMARY KEY,
    prompt TEXT NOT NULL,
    negative_prompt TEXT NOT NULL DEFAULT '',
    seed INTEGER NOT NULL,
    steps INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    style_preset_id BLOB,
    original_payload TEXT,
    file_path TEXT,
    file_name TEXT,
    file_size INTEGER,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'success', 'failed')),
    error_message TEXT,
    generation_time_ms INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    -- A success always points at a file; a failure always explains itself and has none.
    CHECK (status <> 'success' OR (file_path IS NOT NULL AND file_path <> '')),
    CHECK (status <> 'failed' OR (error_message IS NOT NULL AND error_message <> ''
                                  AND file_path IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_generations_created ON generations(created_at);
CREATE INDEX IF NOT EXISTS idx_generations_status ON generations(status);

-- Style presets
CREATE TABLE IF NOT EXISTS style_presets (
    preset_id BLOB PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    prefix_prompt TEXT NOT NULL DEFAULT '',
    suffix_prompt TEXT NOT NULL DEFAULT '',
    prefix_negative_prompt TEXT NOT NULL DEFAULT '',
    suffix_negative_prompt TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_style_presets_enabled ON style_presets(enabled, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationRow, StylePresetRow};
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn open_store() -> (SqliteStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"), None)
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn generation(status: &str, created_at: OffsetDateTime) -> GenerationRow {
        let (file_path, file_name, file_size, error_message) = match status {
            "success" => (
                Some("2025/06/novelai_20250601_120000_7.png".to_string()),
                Some("novelai_20250601_120000_7.png".to_string()),
                Some(3),
                None,
            ),
            "failed" => (None, None, None, Some("API error 500: boom".to_string())),
            _ => (None, None, None, None),
        };
        GenerationRow {
            generation_id: Uuid::new_v4(),
            prompt: "a lighthouse".to_string(),
            negative_prompt: "fog".to_string(),
            seed: 7,
            steps: 28,
            width: 832,
            height: 1216,
            style_preset_id: None,
            original_payload: Some("{}".to_string()),
            file_path,
            file_name,
            file_size,
            status: status.to_string(),
            error_message,
            generation_time_ms: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn preset(name: &str, enabled: bool, created_at: OffsetDateTime) -> StylePresetRow {
        StylePresetRow {
            preset_id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            prefix_prompt: "masterpiece".to_string(),
            suffix_prompt: String::new(),
            prefix_negative_prompt: String::new(),
            suffix_negative_prompt: "lowres".to_string(),
            enabled,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_generation() {
        let (store, _dir) = open_store().await;
        let row = generation("success", OffsetDateTime::now_utc());
        store.create_generation(&row).await.unwrap();

        let fetched = store.get_generation(row.generation_id).await.unwrap().unwrap();
        assert_eq!(fetched.prompt, "a lighthouse");
        assert_eq!(fetched.file_size, Some(3));
        assert_eq!(
            fetched.status().unwrap(),
            atelier_core::GenerationStatus::Success
        );

        assert!(store.get_generation(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schema_rejects_success_without_file() {
        let (store, _dir) = open_store().await;
        let mut row = generation("success", OffsetDateTime::now_utc());
        row.file_path = None;

        match store.create_generation(&row).await {
            Err(MetadataError::Constraint(_)) => {}
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_rejects_failure_without_message() {
        let (store, _dir) = open_store().await;
        let mut row = generation("failed", OffsetDateTime::now_utc());
        row.error_message = Some(String::new());

        assert!(matches!(
            store.create_generation(&row).await,
            Err(MetadataError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_generation_id_rejected() {
        let (store, _dir) = open_store().await;
        let row = generation("failed", OffsetDateTime::now_utc());
        store.create_generation(&row).await.unwrap();

        assert!(matches!(
            store.create_generation(&row).await,
            Err(MetadataError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_orders_newest_first_and_skips_unknown() {
        let (store, _dir) = open_store().await;
        let base = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
        let oldest = generation("success", base - time::Duration::seconds(20));
        let middle = generation("failed", base - time::Duration::seconds(10));
        let newest = generation("success", base);
        for row in [&oldest, &middle, &newest] {
            store.create_generation(row).await.unwrap();
        }

        let ids = vec![
            oldest.generation_id,
            Uuid::new_v4(),
            newest.generation_id,
            middle.generation_id,
        ];
        let rows = store.get_generations_batch(&ids).await.unwrap();
        let order: Vec<Uuid> = rows.iter().map(|r| r.generation_id).collect();
        assert_eq!(
            order,
            vec![
                newest.generation_id,
                middle.generation_id,
                oldest.generation_id
            ]
        );

        assert!(store.get_generations_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_generation_time() {
        let (store, _dir) = open_store().await;
        let row = generation("success", OffsetDateTime::now_utc());
        store.create_generation(&row).await.unwrap();

        store
            .update_generation_time(row.generation_id, 1234, OffsetDateTime::now_utc())
            .await
            .unwrap();
        let fetched = store.get_generation(row.generation_id).await.unwrap().unwrap();
        assert_eq!(fetched.generation_time_ms, Some(1234));

        assert!(matches!(
            store
                .update_generation_time(Uuid::new_v4(), 1, OffsetDateTime::now_utc())
                .await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_preset_keeps_identity() {
        let (store, _dir) = open_store().await;
        let now = OffsetDateTime::now_utc();
        let first = store
            .upsert_style_preset(&preset("anime", true, now))
            .await
            .unwrap();

        let mut changed = preset("anime", true, now + time::Duration::seconds(5));
        changed.prefix_prompt = "best quality".to_string();
        let second = store.upsert_style_preset(&changed).await.unwrap();

        assert_eq!(second.preset_id, first.preset_id);
        assert_eq!(second.prefix_prompt, "best quality");
        assert_eq!(second.affixes().suffix_negative_prompt, "lowres");
    }

    #[tokio::test]
    async fn test_disabled_presets_hidden() {
        let (store, _dir) = open_store().await;
        let base = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
        let visible = store
            .upsert_style_preset(&preset("b-visible", true, base))
            .await
            .unwrap();
        let earlier = store
            .upsert_style_preset(&preset("a-earlier", true, base - time::Duration::seconds(1)))
            .await
            .unwrap();
        let hidden = store
            .upsert_style_preset(&preset("hidden", false, base))
            .await
            .unwrap();

        let listed: Vec<String> = store
            .list_enabled_style_presets()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(listed, vec!["a-earlier".to_string(), "b-visible".to_string()]);

        assert!(
            store
                .get_enabled_style_preset(visible.preset_id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_enabled_style_preset(earlier.preset_id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_enabled_style_preset(hidden.preset_id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
