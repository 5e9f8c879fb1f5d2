//! Receiver configuration.
//!
//! Loaded from a JSON file with camelCase keys. Every field has a default, so
//! an empty object (or no file at all) yields a working local setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chunkferry_protocol::constants::{
    DEFAULT_FINAL_AREA_NAME, DEFAULT_SAVE_RETRIES, DEFAULT_SAVE_RETRY_DELAY,
};
use chunkferry_protocol::{DEFAULT_CHUNK_SIZE, STAGING_AREA_NAME};
use chunkferry_transfer::validate_path_segment;

/// Default number of finished sessions kept for status queries.
pub const DEFAULT_RETAINED_SESSIONS: usize = 256;

/// Default time an open session may go without a chunk before it is aborted.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Errors raised while loading or validating a [`ReceiverConfig`].
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

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Construction-time settings for the receiver and its server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiverConfig {
    /// Storage root. Working areas and artifacts live below it.
    pub base_path: PathBuf,
    /// Namespace segment for assembled artifacts.
    pub final_area_name: String,
    /// Namespace segment for per-session working areas.
    pub staging_area_name: String,
    /// Largest accepted chunk payload, also advertised on `/config`.
    pub chunk_size: usize,
    /// Extra save attempts after the first failure.
    pub save_retries: u32,
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub save_retry_delay: Duration,
    pub bind_addr: SocketAddr,
    /// Finished sessions remembered for status queries.
    pub retained_sessions: usize,
    /// Open sessions with no chunk for this long are aborted and purged.
    #[serde(with = "chunkferry_protocol::serde_millis")]
    pub session_idle_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            final_area_name: DEFAULT_FINAL_AREA_NAME.into(),
            staging_area_name: STAGING_AREA_NAME.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            save_retries: DEFAULT_SAVE_RETRIES,
            save_retry_delay: DEFAULT_SAVE_RETRY_DELAY,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            retained_sessions: DEFAULT_RETAINED_SESSIONS,
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }
}

impl ReceiverConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded receiver config");
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunkSize must be greater than 0".into()));
        }
        validate_path_segment("staging area name", &self.staging_area_name)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_path_segment("final area name", &self.final_area_name)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.session_idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "sessionIdleTimeout must be greater than 0".into(),
            ));
        }
        if self.staging_area_name == self.final_area_name {
            return Err(ConfigError::Invalid(format!(
                "staging and final areas must differ: {}",
                self.final_area_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ReceiverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 25_165_824);
        assert_eq!(config.save_retries, 3);
        assert_eq!(config.save_retry_delay, Duration::from_secs(3));
        assert_eq!(config.staging_area_name, "__chunk-staging__");
        assert_eq!(config.session_idle_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn idle_timeout_reads_millis_and_rejects_zero() {
        let config: ReceiverConfig =
            serde_json::from_str(r#"{"sessionIdleTimeout":90000}"#).unwrap();
        assert_eq!(config.session_idle_timeout, Duration::from_secs(90));

        let zero: ReceiverConfig = serde_json::from_str(r#"{"sessionIdleTimeout":0}"#).unwrap();
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ReceiverConfig =
            serde_json::from_str(r#"{"finalAreaName":"media","saveRetryDelay":250}"#).unwrap();
        assert_eq!(config.final_area_name, "media");
        assert_eq!(config.save_retry_delay, Duration::from_millis(250));
        assert_eq!(config.save_retries, 3);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chunkSize":1024,"bindAddr":"0.0.0.0:9000"}}"#).unwrap();

        let config = ReceiverConfig::load(file.path()).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            ReceiverConfig::load(file.path()),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = ReceiverConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.chunk_size = 10;
        config.final_area_name = "../up".into();
        assert!(config.validate().is_err());

        config.final_area_name = config.staging_area_name.clone();
        assert!(config.validate().is_err());
    }
}
