//! Connection owner: the one task that touches the live connection.
//!
//! Callers never see the codec. They send [`Command`]s through a bounded
//! mailbox and wait on a oneshot reply. The owner:
//!
//! - connects, and reconnects with backoff after every loss;
//! - assigns ids and writes requests in mailbox order;
//! - routes responses, read by a helper task, to the matching caller;
//! - lends the writer out through a [`CodecGuard`] on request.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wirecall_protocol::{Request, RequestId, Response, decode_responses, encode};
use wirecall_transport::{
    Codec, ConnectionId, MessageReader, MessageWriter, TransportError,
};

use crate::{ClientConfig, ClientError, CodecGuard, Connector};

/// Reply channel of a pending call.
pub(crate) type CallReply = oneshot::Sender<Result<Response, ClientError>>;

/// Writer half of the codec a connector produces.
pub(crate) type WriterOf<K> = <<K as Connector>::Codec as Codec>::Writer;

/// Why a write did not complete.
#[derive(Debug)]
enum Halt {
    /// The client closed while the write was blocked.
    Shutdown,
    /// The transport failed.
    Failed(TransportError),
}

impl Halt {
    /// What the caller whose message was being written sees.
    fn reply_error(&self) -> ClientError {
        match self {
            Self::Shutdown => ClientError::Closed,
            Self::Failed(_) => ClientError::Interrupted,
        }
    }
}

/// A request for the owner.
pub(crate) enum Command<W> {
    /// Send a request and route its response to `reply`.
    Call { request: Request, reply: CallReply },

    /// Send a notification; `reply` fires once it is written.
    Notify {
        request: Request,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },

    /// Lend the writer out.
    Lend { reply: oneshot::Sender<CodecGuard<W>> },
}

impl<W> Command<W> {
    fn reject(self, error: ClientError) {
        match self {
            Self::Call { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::Notify { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::Lend { .. } => {}
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The client is closing.
    Shutdown,
    /// The connection failed; reconnect.
    Lost,
}

impl Exit {
    fn error(self) -> ClientError {
        match self {
            Self::Shutdown => ClientError::Closed,
            Self::Lost => ClientError::Interrupted,
        }
    }
}

/// The owner actor. Runs inside its own Tokio task.
pub(crate) struct Owner<K: Connector> {
    connector: K,
    config: ClientConfig,
    mailbox: mpsc::Receiver<Command<WriterOf<K>>>,
    shutdown: CancellationToken,
    /// Calls written to the current connection, by local id.
    pending: HashMap<i64, CallReply>,
    next_id: i64,
    next_conn_id: u64,
}

impl<K: Connector> Owner<K> {
    pub(crate) fn new(
        connector: K,
        config: ClientConfig,
        mailbox: mpsc::Receiver<Command<WriterOf<K>>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connector,
            config,
            mailbox,
            shutdown,
            pending: HashMap::new(),
            next_id: 1,
            next_conn_id: 1,
        }
    }

    /// Runs the owner loop until shutdown.
    pub(crate) async fn run(mut self) {
        tracing::debug!("client owner started");

        while let Some(codec) = self.connect().await {
            let conn_id = ConnectionId::new(self.next_conn_id);
            self.next_conn_id += 1;
            tracing::info!(%conn_id, "connected");

            if self.drive(codec, conn_id).await == Exit::Shutdown {
                break;
            }
        }

        // Nothing queued will ever be sent now.
        self.mailbox.close();
        while let Ok(command) = self.mailbox.try_recv() {
            command.reject(ClientError::Closed);
        }

        tracing::debug!("client owner stopped");
    }

    /// Connects, retrying with backoff. `None` means shutdown.
    async fn connect(&mut self) -> Option<K::Codec> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                attempt = self.connector.connect() => attempt,
            };

            let error = match attempt {
                Ok(codec) => return Some(codec),
                Err(e) => e,
            };

            let delay = self.config.backoff();
            tracing::warn!(error = %error, retry_in = ?delay, "connection attempt failed");

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Serves one live connection until it fails or the client closes.
    async fn drive(&mut self, codec: K::Codec, conn_id: ConnectionId) -> Exit {
        let (reader, writer) = codec.split();
        let (inbound_tx, mut inbound) = mpsc::channel(self.config.inbound_buffer);
        let reader_task: JoinHandle<()> = tokio::spawn(read_loop(reader, inbound_tx));

        let mut writer = Some(writer);
        let mut lent: Option<oneshot::Receiver<WriterOf<K>>> = None;

        let exit = loop {
            tokio::select! {
                biased;

                // Shutdown waits for a lent writer to come home.
                _ = self.shutdown.cancelled(), if lent.is_none() => break Exit::Shutdown,

                returned = reclaim(&mut lent), if lent.is_some() => {
                    lent = None;
                    match returned {
                        Ok(w) => {
                            tracing::debug!(%conn_id, "codec released");
                            writer = Some(w);
                        }
                        Err(_) => break Exit::Lost,
                    }
                }

                message = inbound.recv() => match message {
                    Some(Ok(bytes)) => self.dispatch(conn_id, &bytes),
                    Some(Err(e)) => {
                        if e.is_closed() {
                            tracing::info!(%conn_id, "connection closed by peer");
                        } else {
                            tracing::warn!(%conn_id, error = %e, "connection lost");
                        }
                        break Exit::Lost;
                    }
                    None => break Exit::Lost,
                },

                command = self.mailbox.recv(), if lent.is_none() => {
                    let Some(command) = command else {
                        // Every client handle is gone.
                        break Exit::Shutdown;
                    };
                    let Some(mut w) = writer.take() else {
                        command.reject(ClientError::Interrupted);
                        break Exit::Lost;
                    };
                    if let Command::Lend { reply } = command {
                        let (home, back) = oneshot::channel();
                        lent = Some(back);
                        // A caller that gave up drops the guard, which sends
                        // the writer straight back.
                        let _ = reply.send(CodecGuard::new(w, home));
                        tracing::debug!(%conn_id, "codec lent");
                        continue;
                    }
                    let result = self.send(&mut w, command).await;
                    writer = Some(w);
                    match result {
                        Ok(()) => {}
                        Err(Halt::Shutdown) => {
                            tracing::debug!(%conn_id, "write abandoned for shutdown");
                            break Exit::Shutdown;
                        }
                        Err(Halt::Failed(e)) => {
                            tracing::warn!(%conn_id, error = %e, "write failed");
                            break Exit::Lost;
                        }
                    }
                }
            }
        };

        reader_task.abort();
        self.fail_pending(exit);

        let writer = match (writer, lent) {
            (Some(w), _) => Some(w),
            (None, Some(back)) => back.await.ok(),
            (None, None) => None,
        };
        if let Some(mut w) = writer {
            if let Err(e) = w.close().await {
                tracing::debug!(%conn_id, error = %e, "close failed");
            }
        }

        tracing::debug!(%conn_id, ?exit, "connection finished");
        exit
    }

    /// Writes one call or notification.
    ///
    /// Errors end the connection. A write still blocked when the client
    /// closes is abandoned and its caller gets [`ClientError::Closed`].
    async fn send(
        &mut self,
        writer: &mut WriterOf<K>,
        command: Command<WriterOf<K>>,
    ) -> Result<(), Halt> {
        match command {
            Command::Call { mut request, reply } => {
                if reply.is_closed() {
                    tracing::debug!(method = %request.method, "call abandoned before send");
                    return Ok(());
                }

                let id = self.next_id;
                self.next_id += 1;
                request.notification = false;
                request.id = RequestId::Str(format_id(id));

                let bytes = match encode(&request) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        return Ok(());
                    }
                };

                tracing::debug!(id = %request.id, method = %request.method, "sending request");
                match self.write(writer, &bytes).await {
                    Ok(()) => {
                        self.pending.insert(id, reply);
                        Ok(())
                    }
                    Err(halt) => {
                        let _ = reply.send(Err(halt.reply_error()));
                        Err(halt)
                    }
                }
            }
            Command::Notify { request, reply } => {
                let bytes = match encode(&request) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        return Ok(());
                    }
                };

                tracing::debug!(method = %request.method, "sending notification");
                match self.write(writer, &bytes).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                        Ok(())
                    }
                    Err(halt) => {
                        let _ = reply.send(Err(halt.reply_error()));
                        Err(halt)
                    }
                }
            }
            Command::Lend { reply } => {
                drop(reply);
                Ok(())
            }
        }
    }

    /// Writes `bytes`, giving up if the client closes first.
    async fn write(&self, writer: &mut WriterOf<K>, bytes: &[u8]) -> Result<(), Halt> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Halt::Shutdown),
            result = writer.write_message(bytes) => result.map_err(Halt::Failed),
        }
    }

    /// Routes an inbound response (or batch of responses) to its callers.
    fn dispatch(&mut self, conn_id: ConnectionId, bytes: &[u8]) {
        let responses = match decode_responses(bytes) {
            Ok(responses) => responses,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "ignoring undecodable message");
                return;
            }
        };

        for response in responses {
            let reply = match &response.id {
                RequestId::Str(id) => parse_id(id).and_then(|id| self.pending.remove(&id)),
                _ => None,
            };
            match reply {
                Some(reply) => {
                    let _ = reply.send(Ok(response));
                }
                None => {
                    tracing::debug!(%conn_id, id = %response.id, "ignoring response with unknown id");
                }
            }
        }
    }

    /// Resolves every pending call; nothing more will arrive for them.
    fn fail_pending(&mut self, exit: Exit) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(exit.error()));
        }
    }
}

/// Forwards every message read from the connection to the owner. Stops
/// after the first error.
async fn read_loop<R: MessageReader>(
    mut reader: R,
    inbound: mpsc::Sender<Result<Vec<u8>, TransportError>>,
) {
    loop {
        let result = reader.read_message().await;
        let failed = result.is_err();
        if inbound.send(result).await.is_err() || failed {
            break;
        }
    }
}

/// Waits for a lent writer. Pends forever if nothing is lent.
async fn reclaim<W>(
    lent: &mut Option<oneshot::Receiver<W>>,
) -> Result<W, oneshot::error::RecvError> {
    match lent {
        Some(back) => back.await,
        None => std::future::pending().await,
    }
}

/// Wire form of a local id: lowercase hex, `-` prefixed when negative.
pub(crate) fn format_id(id: i64) -> String {
    if id < 0 {
        format!("-{:x}", id.unsigned_abs())
    } else {
        format!("{id:x}")
    }
}

/// Inverse of [`format_id`]. `None` for anything this client could not
/// have issued.
pub(crate) fn parse_id(id: &str) -> Option<i64> {
    if id.is_empty() || id.starts_with('+') {
        return None;
    }
    i64::from_str_radix(id, 16).ok()
}
