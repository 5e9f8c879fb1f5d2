//! In-memory backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::{StorageError, StorageFuture, StorageGateway, StorageResult, key_segments};

/// Map-backed storage. Writes are atomic by construction.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all object keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.objects.keys().cloned().collect()
    }

    fn put_sync(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let segments = key_segments(key)?;
        let mut inner = self.inner.write().unwrap();
        if inner.dirs.contains(key) {
            return Err(StorageError::InvalidKey(format!(
                "key names a directory: {key}"
            )));
        }
        for depth in 1..segments.len() {
            let dir = segments[..depth].join("/");
            inner.dirs.insert(dir);
        }
        inner.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn exists_sync(&self, key: &str) -> StorageResult<bool> {
        key_segments(key)?;
        let inner = self.inner.read().unwrap();
        Ok(inner.objects.contains_key(key) || inner.dirs.contains(key))
    }

    fn delete_dir_sync(&self, key: &str) -> StorageResult<()> {
        key_segments(key)?;
        let prefix = format!("{key}/");
        let mut inner = self.inner.write().unwrap();
        inner.objects.retain(|k, _| !k.starts_with(&prefix));
        inner.dirs.retain(|d| d != key && !d.starts_with(&prefix));
        Ok(())
    }
}

impl StorageGateway for MemoryStorage {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StorageFuture<'a, ()> {
        Box::pin(async move { self.put_sync(key, data) })
    }

    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Vec<u8>> {
        Box::pin(async move {
            key_segments(key)?;
            let inner = self.inner.read().unwrap();
            inner
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move { self.exists_sync(key) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            key_segments(key)?;
            self.inner.write().unwrap().objects.remove(key);
            Ok(())
        })
    }

    fn create_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let segments = key_segments(key)?;
            let mut inner = self.inner.write().unwrap();
            for depth in 1..=segments.len() {
                inner.dirs.insert(segments[..depth].join("/"));
            }
            Ok(())
        })
    }

    fn delete_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move { self.delete_dir_sync(key) })
    }
}
