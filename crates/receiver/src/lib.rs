//! Server side of the chunked upload protocol.
//!
//! A [`ChunkReceiver`] persists each uploaded chunk into a per-session
//! working area, retrying failed saves a bounded number of times. When the
//! chunk flagged as last arrives, the [`ChunkAssembler`] concatenates every
//! chunk in ordinal order into the final artifact, or aborts and purges the
//! working area if any chunk is missing.
//!
//! [`http::router`] exposes the receiver over axum and [`ReceiverServer`]
//! runs it until cancelled.

mod assembler;
mod config;
pub mod http;
mod layout;
mod receiver;
mod registry;
mod server;

pub use assembler::{AssembledArtifact, AssemblyError, ChunkAssembler};
pub use config::{ConfigError, ReceiverConfig};
pub use layout::StorageLayout;
pub use receiver::{ChunkReceiver, ChunkUpload, ReceiveOutcome};
pub use registry::SessionRegistry;
pub use server::ReceiverServer;

use chunkferry_protocol::SessionState;
use chunkferry_storage::StorageError;
use chunkferry_transfer::{SessionError, TransferError};

/// Errors returned by [`ChunkReceiver::receive_chunk`].
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("invalid chunk: {0}")]
    Validation(String),

    #[error("failed to save {key} after {attempts} attempts: {source}")]
    Save {
        key: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("session {id} is {state:?} and no longer accepts chunks")]
    SessionClosed { id: String, state: SessionState },
}

impl From<SessionError> for ReceiverError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotOpen { id, state } => Self::SessionClosed { id, state },
            mismatch @ SessionError::MetadataMismatch { .. } => {
                Self::Validation(mismatch.to_string())
            }
        }
    }
}

impl From<TransferError> for ReceiverError {
    fn from(err: TransferError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Errors produced by the receiver server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
