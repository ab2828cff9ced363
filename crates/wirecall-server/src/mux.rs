//! Method-name routing.

use std::collections::HashMap;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use wirecall_protocol::{Request, Response, RpcError};

use crate::{Handler, handler_fn};

/// Object-safe form of [`Handler`], so handlers of different types can
/// share one table.
trait DynHandler: Send + Sync + 'static {
    fn handle_boxed(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> BoxFuture<'_, Result<Response, RpcError>>;
}

impl<H: Handler> DynHandler for H {
    fn handle_boxed(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> BoxFuture<'_, Result<Response, RpcError>> {
        self.handle(cancel, request).boxed()
    }
}

/// A [`Handler`] that routes each request to the handler registered for
/// its method.
///
/// Unknown methods get `METHOD_NOT_FOUND` with the message
/// `unknown method "<name>"`.
#[derive(Default)]
pub struct ServeMux {
    routes: HashMap<String, Box<dyn DynHandler>>,
}

impl ServeMux {
    /// Creates an empty mux.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`, replacing any earlier one.
    pub fn route(mut self, method: impl Into<String>, handler: impl Handler) -> Self {
        self.insert(method, handler);
        self
    }

    /// Registers an async closure for `method`.
    pub fn route_fn<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, RpcError>> + Send,
    {
        self.route(method, handler_fn(f))
    }

    /// Registers `handler` for `method` in place.
    ///
    /// Returns `true` if a handler for `method` was replaced.
    pub fn insert(&mut self, method: impl Into<String>, handler: impl Handler) -> bool {
        self.routes.insert(method.into(), Box::new(handler)).is_some()
    }

    /// Returns `true` if `method` has a handler.
    pub fn contains(&self, method: &str) -> bool {
        self.routes.contains_key(method)
    }

    /// Iterates over the registered method names, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl Handler for ServeMux {
    async fn handle(
        &self,
        cancel: CancellationToken,
        request: Request,
    ) -> Result<Response, RpcError> {
        match self.routes.get(&request.method) {
            Some(handler) => handler.handle_boxed(cancel, request).await,
            None => Err(RpcError::method_not_found(&request.method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirecall_protocol::ErrorCode;

    use super::*;

    fn mux() -> ServeMux {
        ServeMux::new()
            .route_fn("a", |_c, _r| async { Ok(Response::ok(json!("a"))) })
            .route_fn("b", |_c, _r| async { Ok(Response::ok(json!("b"))) })
    }

    #[tokio::test]
    async fn test_routes_by_method() {
        let mux = mux();
        for method in ["a", "b"] {
            let response = mux
                .handle(CancellationToken::new(), Request::new(method))
                .await
                .unwrap();
            assert_eq!(response.into_result().unwrap(), json!(method));
        }
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = mux()
            .handle(CancellationToken::new(), Request::new("foobar"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::METHOD_NOT_FOUND);
        assert_eq!(err.to_string(), "unknown method \"foobar\"");
    }

    #[test]
    fn test_insert_reports_replacement() {
        let mut mux = mux();
        assert!(mux.insert("a", handler_fn(|_c, _r| async { Ok(Response::null()) })));
        assert!(!mux.insert("c", handler_fn(|_c, _r| async { Ok(Response::null()) })));
        assert!(mux.contains("c"));

        let mut methods: Vec<_> = mux.methods().collect();
        methods.sort_unstable();
        assert_eq!(methods, ["a", "b", "c"]);
    }
}
