//! [`Server`] and the [`serve`] shortcut.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use wirecall_transport::{Codec, ConnectionId, StreamCodec, TransportError};

use crate::Handler;
use crate::dispatch::serve_connection;

/// Shared server state, one per [`Server`] and its clones.
struct Shared<H> {
    handler: Arc<H>,
    next_conn_id: AtomicU64,
}

/// Serves JSON-RPC over any number of connections with one handler.
///
/// Cloning is cheap; clones share the handler and the connection-id
/// counter.
pub struct Server<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for Server<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: Handler> Server<H> {
    /// Creates a server around `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler: Arc::new(handler),
                next_conn_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    /// Serves one connection until it closes.
    ///
    /// Always ends with the error that stopped the read loop; by then every
    /// in-flight handler has finished and the codec has been closed.
    pub async fn serve<C: Codec>(&self, codec: C) -> Result<(), TransportError> {
        let conn_id = ConnectionId::new(self.shared.next_conn_id.fetch_add(1, Ordering::Relaxed));
        serve_connection(codec, Arc::clone(&self.shared.handler), conn_id).await
    }

    /// Accepts TCP connections forever, serving each with
    /// [`StreamCodec`] framing on its own task.
    ///
    /// Only returns if accepting fails.
    pub async fn run_tcp(&self, listener: TcpListener) -> Result<(), TransportError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "wirecall server listening");
        }

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;
            tracing::debug!(%peer, "accepted connection");

            let server = self.clone();
            tokio::spawn(async move {
                match server.serve(StreamCodec::from_tcp(stream)).await {
                    Err(e) if e.is_closed() => tracing::debug!(%peer, "connection closed"),
                    Err(e) => tracing::warn!(%peer, error = %e, "connection failed"),
                    Ok(()) => {}
                }
            });
        }
    }
}

/// Serves one connection with `handler`.
///
/// Shortcut for `Server::new(handler).serve(codec)`.
pub async fn serve<C, H>(codec: C, handler: H) -> Result<(), TransportError>
where
    C: Codec,
    H: Handler,
{
    Server::new(handler).serve(codec).await
}
