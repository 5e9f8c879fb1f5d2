use std::time::Duration;

/// Errors produced while delivering a chunk request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}
