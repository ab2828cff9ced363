//! The [`Connector`] hook for opening connections.

use std::future::Future;

use wirecall_transport::{Codec, TransportError};

/// Opens one connection for a [`Client`](crate::Client).
///
/// The client calls `connect` once at start-up and again after every
/// connection loss. A failed attempt is retried after the configured
/// backoff. When the client closes, an attempt still in progress is
/// dropped, so implementations need no cancellation handling of their
/// own.
///
/// Any `Fn() -> impl Future<Output = Result<C, TransportError>>` closure
/// is a connector:
///
/// ```rust,no_run
/// use wirecall_client::{Client, ClientConfig};
/// use wirecall_transport::StreamCodec;
///
/// # async fn run() {
/// let client = Client::new(
///     || StreamCodec::connect_tcp("127.0.0.1:4000"),
///     ClientConfig::default(),
/// );
/// # }
/// ```
pub trait Connector: Send + Sync + 'static {
    /// The codec each successful attempt produces.
    type Codec: Codec;

    /// Makes one connection attempt.
    fn connect(&self) -> impl Future<Output = Result<Self::Codec, TransportError>> + Send;
}

impl<F, Fut, C> Connector for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, TransportError>> + Send,
    C: Codec,
{
    type Codec = C;

    fn connect(&self) -> impl Future<Output = Result<C, TransportError>> + Send {
        self()
    }
}
