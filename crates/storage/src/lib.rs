//! Image file storage for atelier.
//!
//! This crate provides:
//! - The `ObjectStore` abstraction keyed by relative, date-partitioned paths
//! - Atomic, no-clobber writes so a generated image never replaces another
//! - A local filesystem backend with path traversal protection

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::ObjectStore;

use atelier_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
