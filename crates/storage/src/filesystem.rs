//! Local filesystem backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{StorageError, StorageFuture, StorageGateway, StorageResult, key_segments};

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Creates a backend rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to an absolute path below the root.
    pub fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let segments = key_segments(key)?;
        let mut path = self.root.clone();
        path.extend(segments);
        Ok(path)
    }

    async fn write_atomic(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique sibling name so concurrent writers of one key never share a temp file.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{file_name}.tmp.{}", uuid::Uuid::new_v4()));

        let result: std::io::Result<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp file");
            }
            return Err(e.into());
        }

        debug!(key, size = data.len(), "object written");
        Ok(())
    }
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

impl StorageGateway for FilesystemStorage {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StorageFuture<'a, ()> {
        Box::pin(self.write_atomic(key, data))
    }

    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            if fs::metadata(&path)
                .await
                .map_err(|e| not_found_or_io(key, e))?
                .is_dir()
            {
                return Err(StorageError::NotFound(key.to_string()));
            }
            fs::read(&path).await.map_err(|e| not_found_or_io(key, e))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            Ok(fs::try_exists(&path).await?)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn create_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            fs::create_dir_all(&path).await?;
            Ok(())
        })
    }

    fn delete_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.key_path(key)?;
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(key, "directory removed");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_then_get() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage.put("a/b/c.bin", b"hello").await.unwrap();
        assert_eq!(storage.get("a/b/c.bin").await.unwrap(), b"hello");
        assert_eq!(std::fs::read(dir.path().join("a/b/c.bin")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn put_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage.put("s1/f_chunk_1", b"first").await.unwrap();
        storage.put("s1/f_chunk_1", b"second").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("s1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["f_chunk_1".to_string()]);
        assert_eq!(storage.get("s1/f_chunk_1").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn failed_put_leaves_nothing_visible() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        // A directory occupying the target key makes the final rename fail.
        std::fs::create_dir_all(dir.path().join("s1/f_chunk_1/blocker")).unwrap();
        assert!(storage.put("s1/f_chunk_1", b"data").await.is_err());

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("s1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["f_chunk_1".to_string()]);
        assert!(matches!(
            storage.get("s1/f_chunk_1").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        assert!(matches!(
            storage.get("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_dir_all_is_recursive_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage.create_dir_all("stage/s1").await.unwrap();
        storage.put("stage/s1/x_chunk_1", b"1").await.unwrap();
        storage.put("stage/s1/x_chunk_2", b"2").await.unwrap();
        assert!(storage.exists("stage/s1").await.unwrap());

        storage.delete_dir_all("stage/s1").await.unwrap();
        assert!(!storage.exists("stage/s1").await.unwrap());
        storage.delete_dir_all("stage/s1").await.unwrap();
    }

    #[tokio::test]
    async fn delete_missing_object_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        storage.delete("missing/file").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        assert!(matches!(
            storage.put("../escape", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.get("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
