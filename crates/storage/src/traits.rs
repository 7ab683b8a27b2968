//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Object store abstraction for generated images.
///
/// Keys are relative, `/`-separated paths such as `2025/06/novelai_20250601_120000_42.png`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Put an object only if it doesn't exist.
    ///
    /// Returns `false` without writing when the key is taken.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
