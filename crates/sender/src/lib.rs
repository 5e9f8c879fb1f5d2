//! Client side of the chunked upload protocol.
//!
//! [`ChunkSender`] splits a file with [`chunkferry_transfer::ChunkReader`]
//! and sends the chunks strictly in order through a [`ChunkTransport`],
//! pacing requests and retrying transport failures once. Every outcome,
//! including bad input, is reported as a [`SendResult`].

mod config;
mod error;
mod sender;
mod transport;

pub use config::{ConfigError, SenderConfig};
pub use error::TransportError;
pub use sender::{ChunkSender, FailureKind, SendEvent, SendRequest, SendResult};
pub use transport::{ChunkRequest, ChunkTransport, HttpTransport, TransportFuture};
