//! Storage gateway for chunked uploads.
//!
//! All protocol logic reaches persistent state through [`StorageGateway`],
//! addressing objects by relative `/`-separated keys rooted at a base path.
//! Two backends ship with the crate:
//!
//! - [`FilesystemStorage`]: local disk, atomic writes (temp file + rename)
//! - [`MemoryStorage`]: in-process map, for tests and embedding

mod filesystem;
mod memory;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;

use std::future::Future;
use std::pin::Pin;

/// Errors produced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A boxed future returned by gateway methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Scoped byte storage used by the receiver and assembler.
///
/// Keys are relative paths such as `__chunk-staging__/s1/video.mp4_chunk_1`.
/// Implementations must make [`put`](Self::put) all-or-nothing: a failed
/// write never leaves a partial object visible under the key.
pub trait StorageGateway: Send + Sync + 'static {
    /// Writes `data` under `key`, replacing any previous object.
    /// Parent directories are created as needed.
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StorageFuture<'a, ()>;

    /// Reads the full object. Missing objects yield [`StorageError::NotFound`].
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Vec<u8>>;

    /// Returns `true` if an object or directory exists under `key`.
    fn exists<'a>(&'a self, key: &'a str) -> StorageFuture<'a, bool>;

    /// Removes a single object. Missing objects are not an error.
    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;

    /// Creates a directory and all missing parents.
    fn create_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;

    /// Recursively removes a directory. Missing directories are not an error.
    fn delete_dir_all<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;
}

/// Splits a key into validated segments.
///
/// Rejects empty keys, absolute keys and `.`/`..` segments so a key can
/// never escape the storage root.
pub(crate) fn key_segments(key: &str) -> StorageResult<Vec<&str>> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".into()));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "absolute key not allowed: {key}"
        )));
    }

    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        match *segment {
            "" => {
                return Err(StorageError::InvalidKey(format!(
                    "empty segment in key: {key}"
                )));
            }
            "." | ".." => {
                return Err(StorageError::InvalidKey(format!(
                    "relative segment not allowed: {key}"
                )));
            }
            s if s.contains('\\') || s.contains(':') => {
                return Err(StorageError::InvalidKey(format!(
                    "path prefix not allowed: {key}"
                )));
            }
            _ => {}
        }
    }

    Ok(segments)
}
