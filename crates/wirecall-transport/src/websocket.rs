//! WebSocket codec using `tokio-tungstenite`.
//!
//! One JSON-RPC message per WebSocket frame; no header framing is needed
//! because the WebSocket protocol already delimits messages.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Codec, MessageReader, MessageWriter, TransportError};

/// A [`Codec`] over an established WebSocket connection.
pub struct WebSocketCodec<S> {
    ws: WebSocketStream<S>,
}

impl WebSocketCodec<MaybeTlsStream<TcpStream>> {
    /// Connects to a `ws://` URL.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        tracing::debug!(url, "websocket connection established");
        Ok(Self { ws })
    }
}

impl WebSocketCodec<TcpStream> {
    /// Performs the server side of the WebSocket handshake on an accepted
    /// TCP connection.
    pub async fn accept(stream: TcpStream) -> Result<Self, TransportError> {
        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;
        Ok(Self { ws })
    }
}

impl<S> WebSocketCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already negotiated WebSocket stream.
    pub fn from_stream(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

impl<S> Codec for WebSocketCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WebSocketReader<S>;
    type Writer = WebSocketWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        (WebSocketReader { stream }, WebSocketWriter { sink })
    }
}

/// Receiving half of a [`WebSocketCodec`].
pub struct WebSocketReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> MessageReader for WebSocketReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_message(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(text.as_bytes().to_vec());
                }
                Some(Ok(Message::Binary(data))) => return Ok(data.into()),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::ConnectionClosed(
                        "websocket closed".into(),
                    ));
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }
}

/// Sending half of a [`WebSocketCodec`].
pub struct WebSocketWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> MessageWriter for WebSocketWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_message(
        &mut self,
        message: &[u8],
    ) -> Result<(), TransportError> {
        let msg = match std::str::from_utf8(message) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(message.to_vec().into()),
        };
        self.sink.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}
