pub mod constants;
pub mod serde_millis;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_CHUNK_SIZE, STAGING_AREA_NAME};
pub use types::{
    ChunkMeta, ChunkNameError, ReceiverLimits, SessionState, SessionStatus, chunk_file_name,
    parse_chunk_file_name,
};
