//! The public [`Client`] handle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wirecall_protocol::{ProtocolError, Request, Response};
use wirecall_transport::Codec;

use crate::owner::{Command, Owner};
use crate::{ClientConfig, ClientError, CodecGuard, Connector};

/// State shared by every clone of a [`Client`].
struct Inner<W> {
    mailbox: mpsc::Sender<Command<W>>,
    shutdown: CancellationToken,
    owner: Mutex<Option<JoinHandle<()>>>,
}

impl<W> Drop for Inner<W> {
    fn drop(&mut self) {
        // Last handle gone: stop the owner even if nobody called close().
        self.shutdown.cancel();
    }
}

/// A JSON-RPC client over one reconnecting connection.
///
/// Any number of tasks may call concurrently; their requests share the
/// connection and responses are matched back by id. Cloning is cheap and
/// clones share the connection.
///
/// # Example
///
/// ```rust,no_run
/// use wirecall_client::{Client, ClientConfig};
/// use wirecall_transport::StreamCodec;
///
/// # async fn run() -> Result<(), wirecall_client::ClientError> {
/// let client = Client::new(
///     || StreamCodec::connect_tcp("127.0.0.1:4000"),
///     ClientConfig::default(),
/// );
/// let sum: i64 = client.call_method("add", [1, 2]).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<C: Codec> {
    inner: Arc<Inner<C::Writer>>,
}

impl<C: Codec> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Codec> Client<C> {
    /// Starts a client. Connecting happens in the background; calls made
    /// before the first connection succeeds wait for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<K>(connector: K, config: ClientConfig) -> Self
    where
        K: Connector<Codec = C>,
    {
        let config = config.validated();
        let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_size);
        let shutdown = CancellationToken::new();

        let owner = Owner::new(connector, config, mailbox_rx, shutdown.clone());
        let handle = tokio::spawn(owner.run());

        Self {
            inner: Arc::new(Inner {
                mailbox: mailbox_tx,
                shutdown,
                owner: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Sends a request, or a notification, and waits for the outcome.
    ///
    /// For a call, returns the server's response, whose outcome may be an
    /// error object. The request's `id` is replaced by one the client
    /// assigns when it writes the request. For a notification, returns
    /// `None` once the message is written.
    ///
    /// Dropping the future stops the wait but not the request: it may
    /// already be on the wire, and no `$/cancelRequest` is sent.
    ///
    /// # Errors
    /// - `InvalidRequest` if `params` is not an array or object (nothing
    ///   is sent)
    /// - `Interrupted` if the connection dropped first
    /// - `Closed` if the client is closed
    pub async fn call(&self, request: Request) -> Result<Option<Response>, ClientError> {
        check_params(&request)?;
        if request.notification {
            self.send_notification(request).await?;
            Ok(None)
        } else {
            self.send_call(request).await.map(Some)
        }
    }

    /// [`call`](Self::call) with a time limit.
    ///
    /// # Errors
    /// `DeadlineExceeded` if `timeout` passes first, plus everything
    /// `call` returns.
    pub async fn call_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Option<Response>, ClientError> {
        tokio::time::timeout(timeout, self.call(request))
            .await
            .map_err(|_| ClientError::DeadlineExceeded)?
    }

    /// [`call`](Self::call) that gives up when `cancel` fires.
    ///
    /// # Errors
    /// `Cancelled` if `cancel` fires first, plus everything `call`
    /// returns.
    pub async fn call_cancellable(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Option<Response>, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.call(request) => result,
        }
    }

    /// Calls `method` with serialized `params` and deserializes the result.
    ///
    /// Params that serialize to `null` (such as `()`) are omitted.
    ///
    /// # Errors
    /// `Rpc` if the server answered with an error, `Protocol` if params
    /// or result do not (de)serialize, plus everything `call` returns.
    pub async fn call_method<P, R>(&self, method: &str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = build_request(Request::new(method), params)?;
        let response = self.send_call(request).await?;
        let result = response.into_result()?;
        serde_json::from_value(result).map_err(|e| ProtocolError::Decode(e).into())
    }

    /// Sends a notification with serialized `params`.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), ClientError> {
        let request = build_request(Request::notification(method), params)?;
        self.send_notification(request).await
    }

    /// Borrows the live connection's writer.
    ///
    /// Waits until a connection is up and every call queued before this
    /// one has been written. Queued calls are held back until the guard
    /// is released; responses keep flowing meanwhile.
    ///
    /// # Errors
    /// `Closed` if the client closes first.
    pub async fn codec(&self) -> Result<CodecGuard<C::Writer>, ClientError> {
        let (reply, guard) = oneshot::channel();
        self.enqueue(Command::Lend { reply }).await?;
        guard.await.map_err(|_| self.gone())
    }

    /// Stops the client and waits until its connection is closed.
    ///
    /// Pending and queued calls fail with `Closed`. An outstanding
    /// [`CodecGuard`] delays this until it is released. Safe to call more
    /// than once; later calls wait for the first to finish.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let mut owner = self.inner.owner.lock().await;
        if let Some(handle) = owner.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "client owner task failed");
            }
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    async fn send_call(&self, request: Request) -> Result<Response, ClientError> {
        let (reply, response) = oneshot::channel();
        self.enqueue(Command::Call { request, reply }).await?;
        response.await.map_err(|_| self.gone())?
    }

    async fn send_notification(&self, request: Request) -> Result<(), ClientError> {
        let (reply, written) = oneshot::channel();
        self.enqueue(Command::Notify { request, reply }).await?;
        written.await.map_err(|_| self.gone())?
    }

    async fn enqueue(&self, command: Command<C::Writer>) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.inner
            .mailbox
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// The error for a reply channel the owner dropped.
    fn gone(&self) -> ClientError {
        if self.is_closed() {
            ClientError::Closed
        } else {
            ClientError::Interrupted
        }
    }
}

fn check_params(request: &Request) -> Result<(), ClientError> {
    if request.has_valid_params() {
        Ok(())
    } else {
        Err(ClientError::InvalidRequest(
            "params must be an array or an object".into(),
        ))
    }
}

fn build_request<P: Serialize>(request: Request, params: P) -> Result<Request, ClientError> {
    let params = serde_json::to_value(params).map_err(ProtocolError::Encode)?;
    let request = match params {
        Value::Null => request,
        params => request.with_params(params),
    };
    check_params(&request)?;
    Ok(request)
}
