//! # wirecall
//!
//! JSON-RPC 2.0 over framed byte streams and WebSockets.
//!
//! wirecall has a reconnecting, multiplexing [`Client`] and a concurrent
//! [`Server`] that dispatches every request to its own task, with
//! `$/cancelRequest` support. Both sit on a small [`Codec`] abstraction,
//! with `Content-Length` framing ([`StreamCodec`]) and WebSocket
//! ([`WebSocketCodec`]) implementations included.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirecall::prelude::*;
//!
//! # async fn run() -> Result<(), WirecallError> {
//! let mux = ServeMux::new().route_fn("add", |_cancel, req: Request| async move {
//!     let [a, b]: [i64; 2] = req.params_as()?;
//!     Ok(Response::ok(serde_json::json!(a + b)))
//! });
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//! tokio::spawn(async move { Server::new(mux).run_tcp(listener).await });
//!
//! let client = Client::new(
//!     || StreamCodec::connect_tcp("127.0.0.1:4000"),
//!     ClientConfig::default(),
//! );
//! let sum: i64 = client.call_method("add", [1, 2]).await?;
//! assert_eq!(sum, 3);
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | module | crate |
//! |--------|-------|
//! | [`transport`] | framing, codecs |
//! | [`protocol`] | requests, responses, error codes |
//! | [`server`] | dispatcher, handlers, method routing |
//! | [`client`] | reconnecting client |

mod error;
pub mod logging;

pub use error::WirecallError;

pub use wirecall_client as client;
pub use wirecall_protocol as protocol;
pub use wirecall_server as server;
pub use wirecall_transport as transport;

pub use wirecall_client::{Client, ClientConfig, ClientError, CodecGuard, Connector};
pub use wirecall_protocol::{
    ErrorCode, ErrorObject, Outcome, ProtocolError, Request, RequestId, Response, RpcError,
};
pub use wirecall_server::{Handler, ServeMux, Server, handler_fn, serve};
pub use wirecall_transport::{Codec, MessageReader, MessageWriter, StreamCodec, TransportError};
#[cfg(feature = "websocket")]
pub use wirecall_transport::WebSocketCodec;

/// Everything needed to write a client or a server.
pub mod prelude {
    pub use tokio_util::sync::CancellationToken;

    pub use crate::WirecallError;
    pub use wirecall_client::{Client, ClientConfig, ClientError};
    pub use wirecall_protocol::{ErrorCode, Request, RequestId, Response, RpcError};
    pub use wirecall_server::{Handler, ServeMux, Server, handler_fn, serve};
    pub use wirecall_transport::{Codec, StreamCodec, TransportError};
    #[cfg(feature = "websocket")]
    pub use wirecall_transport::WebSocketCodec;
}
