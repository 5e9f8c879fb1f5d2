use serde::{Deserialize, Serialize};

use crate::constants::{CHUNK_NAME_SEPARATOR, fields};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Chunks are being received.
    #[serde(rename = "open")]
    Open,
    /// The last chunk arrived and the merge is running.
    #[serde(rename = "assembling")]
    Assembling,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "aborted")]
    Aborted,
}

impl SessionState {
    /// Returns `true` once the session can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Metadata accompanying every chunk of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    pub session_id: String,
    pub file_name: String,
    /// 1-based position within the session.
    pub ordinal: u32,
    pub total_chunks: u32,
    /// Declared byte length of the reassembled file.
    pub total_size: u64,
    pub is_last: bool,
}

impl ChunkMeta {
    /// Name of the multipart file part and of the stored chunk file.
    pub fn chunk_file_name(&self) -> String {
        chunk_file_name(&self.file_name, self.ordinal)
    }

    /// Text fields sent alongside the binary part.
    pub fn form_fields(&self) -> [(&'static str, String); 5] {
        [
            (fields::SESSION_ID, self.session_id.clone()),
            (fields::IS_DONE, self.is_last.to_string()),
            (fields::TOTAL_SIZE, self.total_size.to_string()),
            (fields::TOTAL_CHUNKS, self.total_chunks.to_string()),
            (fields::FILE_NAME, self.file_name.clone()),
        ]
    }
}

/// Session summary exposed by the receiver's status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub file_name: String,
    pub state: SessionState,
    pub total_chunks: u32,
    pub total_size: u64,
    pub received_chunks: u32,
    pub received_bytes: u64,
}

/// Limits the receiver advertises to senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverLimits {
    /// Largest chunk payload accepted per request.
    pub chunk_size: usize,
}

/// Error returned when a chunk file name does not follow `{file}_chunk_{n}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkNameError {
    #[error("missing chunk separator in {0:?}")]
    MissingSeparator(String),

    #[error("invalid chunk ordinal in {0:?}")]
    InvalidOrdinal(String),
}

/// Builds the deterministic chunk file name `{file_name}_chunk_{ordinal}`.
pub fn chunk_file_name(file_name: &str, ordinal: u32) -> String {
    format!("{file_name}{CHUNK_NAME_SEPARATOR}{ordinal}")
}

/// Splits a chunk file name back into its logical file name and ordinal.
///
/// The last separator wins, so file names that themselves contain
/// `_chunk_` still round-trip.
pub fn parse_chunk_file_name(name: &str) -> Result<(&str, u32), ChunkNameError> {
    let (file_name, ordinal) = name
        .rsplit_once(CHUNK_NAME_SEPARATOR)
        .ok_or_else(|| ChunkNameError::MissingSeparator(name.to_string()))?;

    if file_name.is_empty() || ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ChunkNameError::InvalidOrdinal(name.to_string()));
    }

    let ordinal: u32 = ordinal
        .parse()
        .map_err(|_| ChunkNameError::InvalidOrdinal(name.to_string()))?;
    if ordinal == 0 {
        return Err(ChunkNameError::InvalidOrdinal(name.to_string()));
    }

    Ok((file_name, ordinal))
}
