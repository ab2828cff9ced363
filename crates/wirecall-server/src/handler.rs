//! The [`Handler`] trait and its closure adapter.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wirecall_protocol::{Request, Response, RpcError};

/// Answers JSON-RPC requests.
///
/// The dispatcher calls `handle` once per request, each on its own task,
/// so one handler serves many requests concurrently.
///
/// # Trait bounds
///
/// - `Send + Sync` → one handler is shared by every request task.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use wirecall_protocol::{Request, Response, RpcError};
/// use wirecall_server::Handler;
///
/// struct Echo;
///
/// impl Handler for Echo {
///     async fn handle(
///         &self,
///         _cancel: CancellationToken,
///         request: Request,
///     ) -> Result<Response, RpcError> {
///         Ok(Response::ok(request.params.unwrap_or_default()))
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    ///
    /// `cancel` fires only when the client sends `$/cancelRequest` for
    /// this request. It does not fire when the connection goes away:
    /// after a read error the server waits for every in-flight handler to
    /// return, so a handler that waits on nothing but `cancel` keeps
    /// `serve` from returning. The returned response's `id`
    /// is ignored; the dispatcher fills in the request's id. For
    /// notifications the result is discarded.
    fn handle(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> impl Future<Output = Result<Response, RpcError>> + Send;
}

impl<H: Handler> Handler for Arc<H> {
    fn handle(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> impl Future<Output = Result<Response, RpcError>> + Send {
        (**self).handle(cancel, request)
    }
}

/// A [`Handler`] built from a closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Wraps an async closure as a [`Handler`].
///
/// ```rust
/// use wirecall_protocol::{Request, Response};
/// use wirecall_server::handler_fn;
///
/// let handler = handler_fn(|_cancel, request: Request| async move {
///     Ok(Response::ok(serde_json::json!(request.method)))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, RpcError>> + Send,
{
    HandlerFn(f)
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, RpcError>> + Send,
{
    fn handle(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> impl Future<Output = Result<Response, RpcError>> + Send {
        (self.0)(cancel, request)
    }
}
