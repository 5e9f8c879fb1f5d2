//! Chunk splitting and upload session state shared by sender and receiver.

mod chunked;
mod session;
mod validation;

pub use chunked::{Chunk, ChunkReader, chunk_count};
pub use session::{SessionError, UploadSession};
pub use validation::validate_path_segment;

pub use chunkferry_protocol::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {0}")]
    NotAFile(std::path::PathBuf),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("file too large: {chunks} chunks of {chunk_size} bytes exceed the protocol limit")]
    TooManyChunks { chunks: u64, chunk_size: usize },
}
