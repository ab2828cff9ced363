//! Per-connection dispatch loop.
//!
//! The flow for one connection:
//!   1. Read a raw message → decode it, or answer with a parse/shape error
//!   2. `$/cancelRequest` → fire the named request's token
//!   3. Anything else → spawn a task that runs the handler and writes the
//!      response
//!   4. On read error → wait for outstanding handlers, return the error

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use wirecall_protocol::{
    CANCEL_METHOD, ErrorCode, ErrorObject, Request, RequestId, Response, RpcError,
    decode_request, encode,
};
use wirecall_transport::{
    Codec, ConnectionId, MessageReader, MessageWriter, TransportError,
};

use crate::Handler;

/// In-flight requests that can still be cancelled.
type PendingMap = Mutex<HashMap<RequestId, Pending>>;

/// One cancellable request. `seq` tells apart requests that reuse an id.
struct Pending {
    seq: u64,
    token: CancellationToken,
}

/// State shared by the read loop and every request task on one connection.
struct Connection<H, W> {
    id: ConnectionId,
    handler: Arc<H>,
    writer: Mutex<W>,
    pending: PendingMap,
}

/// Serves one connection until its reader fails.
///
/// The read error is returned once every handler task has finished. A
/// peer that simply hung up shows up as an error for which
/// [`TransportError::is_closed`] is true.
pub(crate) async fn serve_connection<C, H>(
    codec: C,
    handler: Arc<H>,
    conn_id: ConnectionId,
) -> Result<(), TransportError>
where
    C: Codec,
    H: Handler,
{
    let (mut reader, writer) = codec.split();
    let conn = Arc::new(Connection {
        id: conn_id,
        handler,
        writer: Mutex::new(writer),
        pending: PendingMap::default(),
    });
    let mut tasks = JoinSet::new();
    let mut next_seq = 0u64;

    tracing::debug!(%conn_id, "serving connection");

    let err = loop {
        let message = match reader.read_message().await {
            Ok(message) => message,
            Err(e) => break e,
        };

        // Reap finished tasks so the set does not grow without bound.
        while let Some(result) = tasks.try_join_next() {
            log_join_error(conn_id, result);
        }

        let request = match decode_request(&message) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "rejecting malformed request");
                let error = ErrorObject::new(e.code(), e.to_string());
                conn.write(&Response::error(RequestId::Null, error)).await;
                continue;
            }
        };

        if request.method == CANCEL_METHOD {
            conn.cancel(request).await;
            continue;
        }

        let token = CancellationToken::new();
        let mut registered = None;
        if !request.notification {
            let mut pending = conn.pending.lock().await;
            if pending.contains_key(&request.id) {
                // The first request keeps the slot and stays cancellable.
                tracing::warn!(%conn_id, id = %request.id, "request id already in flight");
            } else {
                next_seq += 1;
                pending.insert(
                    request.id.clone(),
                    Pending {
                        seq: next_seq,
                        token: token.clone(),
                    },
                );
                registered = Some(next_seq);
            }
        }

        tracing::debug!(
            %conn_id,
            id = %request.id,
            method = %request.method,
            notification = request.notification,
            "dispatching request"
        );
        tasks.spawn(Arc::clone(&conn).run(token, request, registered));
    };

    tracing::debug!(%conn_id, error = %err, in_flight = tasks.len(), "read failed, draining");
    while let Some(result) = tasks.join_next().await {
        log_join_error(conn_id, result);
    }

    if let Err(e) = conn.writer.lock().await.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }

    Err(err)
}

impl<H, W> Connection<H, W>
where
    H: Handler,
    W: MessageWriter,
{
    /// Runs the handler for one request and writes its response.
    ///
    /// `registered` is the request's slot in the pending map, if it got one.
    async fn run(
        self: Arc<Self>,
        token: CancellationToken,
        request: Request,
        registered: Option<u64>,
    ) {
        let id = request.id.clone();
        let notification = request.notification;
        let method = request.method.clone();

        let handler = Arc::clone(&self.handler);
        let outcome = AssertUnwindSafe(async move { handler.handle(token, request).await })
            .catch_unwind()
            .await;

        if let Some(seq) = registered {
            let mut pending = self.pending.lock().await;
            if pending.get(&id).is_some_and(|entry| entry.seq == seq) {
                pending.remove(&id);
            }
        }

        let response = match outcome {
            Ok(Ok(mut response)) => {
                response.id = id;
                response
            }
            Ok(Err(err)) => Response::error(id, err.to_error_object()),
            Err(_) => {
                tracing::error!(conn_id = %self.id, %method, "handler panicked");
                Response::error(
                    id,
                    ErrorObject::new(ErrorCode::INTERNAL_ERROR, "handler panicked"),
                )
            }
        };

        if notification {
            if let Err(error) = response.into_result() {
                tracing::debug!(conn_id = %self.id, %method, %error, "notification failed");
            }
            return;
        }
        self.write(&response).await;
    }

    /// Handles `$/cancelRequest`.
    async fn cancel(&self, request: Request) {
        match cancel_target(&request) {
            Ok(target) => {
                if let Some(entry) = self.pending.lock().await.remove(&target) {
                    tracing::debug!(conn_id = %self.id, id = %target, "cancelling request");
                    entry.token.cancel();
                }
                if !request.notification {
                    self.write(&Response::result(request.id, Value::Null)).await;
                }
            }
            Err(err) if request.notification => {
                tracing::debug!(conn_id = %self.id, error = %err, "ignoring malformed cancel");
            }
            Err(err) => {
                self.write(&Response::error(request.id, err.to_error_object()))
                    .await;
            }
        }
    }

    /// Writes one response. Failures are logged and dropped.
    async fn write(&self, response: &Response) {
        let bytes = match encode(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %self.id, error = %e, "failed to encode response");
                return;
            }
        };
        if let Err(e) = self.writer.lock().await.write_message(&bytes).await {
            tracing::warn!(conn_id = %self.id, id = %response.id, error = %e, "failed to write response");
        }
    }
}

/// Extracts `params.id` from a cancel request.
fn cancel_target(request: &Request) -> Result<RequestId, RpcError> {
    let id = request
        .params
        .as_ref()
        .and_then(|params| params.get("id"))
        .ok_or_else(|| RpcError::invalid_params("$/cancelRequest requires params.id"))?;
    RequestId::from_value(id).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn log_join_error(conn_id: ConnectionId, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(%conn_id, error = %e, "request task failed");
    }
}
