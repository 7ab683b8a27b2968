//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Prefix of in-flight temp files; keys may not start with it.
const TEMP_PREFIX: &str = ".tmp.";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path inside the root.
    ///
    /// Runs the symlink checks on the blocking pool since they stat and
    /// canonicalize.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains('\\')
        {
            return Err(StorageError::InvalidKey(format!("not a relative key: {key}")));
        }

        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) if !part.to_string_lossy().starts_with(TEMP_PREFIX) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // The nearest existing ancestor (or the path itself) must resolve inside
        // the root, so symlinks cannot redirect reads or directory creation.
        let mut ancestor = Some(path.as_path());
        while let Some(candidate) = ancestor {
            match std::fs::symlink_metadata(candidate) {
                Ok(_) => {
                    let resolved = candidate.canonicalize().map_err(|_| {
                        StorageError::InvalidKey(format!("symlink target missing: {key}"))
                    })?;
                    if !resolved.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    ancestor = candidate.parent();
                }
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
        }

        Ok(path)
    }

    /// Write `data` to a fresh temp file beside `path` and fsync it.
    async fn write_temp(&self, path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_name = format!("{TEMP_PREFIX}{}", Uuid::new_v4());
        let temp_path = path.with_file_name(temp_name);
        let mut file = fs::File::create(&temp_path).await?;
        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(temp_path)
    }
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(|e| not_found_or_io(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        let temp_path = self.write_temp(&path, &data).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        let temp_path = self.write_temp(&path, &data).await?;

        // hard_link refuses to replace an existing file, unlike rename.
        let linked = fs::hard_link(&temp_path, &path).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        if metadata.permissions().readonly() {
            return Err(StorageError::Config(format!(
                "storage root is read-only: {:?}",
                self.root
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "2025/06/novelai_20250601_120000_42.png";
        let data = Bytes::from("png bytes");

        backend.put(key, data.clone()).await.unwrap();
        assert!(dir.path().join(key).is_file());

        let retrieved = backend.get(key).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_put_if_not_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "2025/06/unique.png";
        let data1 = Bytes::from("first");
        let data2 = Bytes::from("second");

        assert!(backend.put_if_not_exists(key, data1.clone()).await.unwrap());
        assert!(!backend.put_if_not_exists(key, data2).await.unwrap());

        let retrieved = backend.get(key).await.unwrap();
        assert_eq!(retrieved, data1);

        // No temp files left behind by either attempt
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("2025/06"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend
            .put("a/b.png", Bytes::from_static(b"x"))
            .await
            .unwrap();
        backend.delete("a/b.png").await.unwrap();
        assert!(!dir.path().join("a/b.png").exists());

        match backend.delete("a/b.png").await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(matches!(
            backend.get("a/b.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        for key in ["../escape", "/absolute/path", "foo/../bar", "./foo", "", "2025/.tmp.abc"] {
            assert!(
                matches!(backend.get(key).await, Err(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }

        // A well-formed key that is simply absent is NotFound, not InvalidKey.
        assert!(matches!(
            backend.get("valid/nested/key.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        std::fs::write(outside_dir.path().join("secret.txt"), "secret").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();

        let read = backend.get("escape/secret.txt").await;
        assert!(matches!(read, Err(StorageError::InvalidKey(_))));

        let write = backend
            .put("escape/nested/file.png", Bytes::from("data"))
            .await;
        assert!(matches!(write, Err(StorageError::InvalidKey(_))));
        assert!(!outside_dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("images"))
            .await
            .unwrap();
        backend.health_check().await.unwrap();
    }
}
