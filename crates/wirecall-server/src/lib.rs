//! JSON-RPC 2.0 server dispatcher for wirecall.
//!
//! A [`Server`] reads requests from a [`Codec`](wirecall_transport::Codec)
//! one at a time and runs each one on its own task, so a slow handler
//! never holds up the next request. Responses are written back through a
//! single lock as handlers finish, in whatever order they finish.
//!
//! Handlers implement [`Handler`]. For small servers, [`handler_fn`] turns
//! an async closure into one, and [`ServeMux`] routes by method name.
//!
//! # Cancellation
//!
//! Every non-notification request gets its own
//! [`CancellationToken`](tokio_util::sync::CancellationToken). A
//! `$/cancelRequest` notification naming the request's id fires the
//! token; the dispatcher handles this method itself and never forwards it
//! to the handler.
//!
//! # Example
//!
//! ```rust,no_run
//! use wirecall_protocol::{Request, Response};
//! use wirecall_server::{ServeMux, Server};
//! use wirecall_transport::StreamCodec;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mux = ServeMux::new().route_fn("ping", |_cancel, _req: Request| async {
//!     Ok(Response::ok(serde_json::json!("pong")))
//! });
//! let server = Server::new(mux);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//! let (stream, _) = listener.accept().await?;
//! if let Err(e) = server.serve(StreamCodec::from_tcp(stream)).await {
//!     assert!(e.is_closed(), "connection failed: {e}");
//! }
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod handler;
mod mux;
mod server;

pub use handler::{Handler, HandlerFn, handler_fn};
pub use mux::ServeMux;
pub use server::{Server, serve};
