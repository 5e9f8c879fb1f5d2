//! Sender configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chunkferry_protocol::DEFAULT_CHUNK_SIZE;
use chunkferry_protocol::constants::{
    DEFAULT_INTER_CHUNK_DELAY, DEFAULT_SEND_RETRY_DELAY, DEFAULT_STARTUP_DELAY,
};

/// Per-request timeout for one chunk upload.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised while loading a [`SenderConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Chunk size and pacing for a [`ChunkSender`](crate::ChunkSender).
///
/// Durations are whole milliseconds in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderConfig {
    pub chunk_size: usize,
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub startup_delay: Duration,
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub inter_chunk_delay: Duration,
    /// Wait before the single retry of a failed chunk.
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub retry_delay: Duration,
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub request_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            startup_delay: DEFAULT_STARTUP_DELAY,
            inter_chunk_delay: DEFAULT_INTER_CHUNK_DELAY,
            retry_delay: DEFAULT_SEND_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SenderConfig {
    /// Reads a JSON configuration file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
