use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::http;
use crate::receiver::ChunkReceiver;

/// HTTP server for a [`ChunkReceiver`].
///
/// Binding happens in [`bind`](Self::bind) so the local address is known
/// before [`run`](Self::run) starts serving.
pub struct ReceiverServer {
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    local_addr: SocketAddr,
}

impl ReceiverServer {
    /// Binds `addr` (port 0 = OS-assigned).
    pub async fn bind(addr: SocketAddr, receiver: Arc<ChunkReceiver>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            router: http::router(receiver),
            cancel: CancellationToken::new(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serves until the cancel token fires, then drains in-flight requests.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("receiver listening on {}", self.local_addr);
        let cancel = self.cancel.clone();
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        tracing::info!("receiver server stopped");
        Ok(())
    }
}
