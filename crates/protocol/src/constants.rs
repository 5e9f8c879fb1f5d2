use std::time::Duration;

/// Default chunk size: 24 MiB.
///
/// Used by the sender when splitting and by the receiver as the advertised
/// per-request payload limit.
pub const DEFAULT_CHUNK_SIZE: usize = 25_165_824;

/// Namespace segment under which per-session working areas live.
pub const STAGING_AREA_NAME: &str = "__chunk-staging__";

/// Default namespace segment for assembled artifacts.
pub const DEFAULT_FINAL_AREA_NAME: &str = "uploads";

/// Separator between the logical file name and the ordinal in chunk file names.
pub const CHUNK_NAME_SEPARATOR: &str = "_chunk_";

/// Additional attempts the receiver makes after a failed chunk save.
pub const DEFAULT_SAVE_RETRIES: u32 = 3;

/// Fixed delay between chunk save attempts.
pub const DEFAULT_SAVE_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Delay before the sender transmits the first chunk.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(50);

/// Delay between successive chunk sends of a multi-chunk transfer.
pub const DEFAULT_INTER_CHUNK_DELAY: Duration = Duration::from_millis(550);

/// Delay before the single retry of a chunk that hit a transport error.
pub const DEFAULT_SEND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Route accepting multipart chunk uploads.
pub const UPLOAD_ROUTE: &str = "/upload";

/// Multipart field names, one request per chunk.
pub mod fields {
    /// Binary part carrying the chunk payload.
    pub const FILE: &str = "file";
    pub const SESSION_ID: &str = "sessionId";
    /// `"true"` iff this is the final chunk.
    pub const IS_DONE: &str = "isDone";
    pub const TOTAL_SIZE: &str = "totalSize";
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    pub const FILE_NAME: &str = "filename";
}
