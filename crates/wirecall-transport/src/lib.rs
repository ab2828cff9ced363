//! Transport layer for wirecall.
//!
//! Provides the [`Codec`] abstraction the client and server are built on,
//! the header [`framing`] used by stream transports, and two concrete
//! codecs:
//!
//! - [`StreamCodec`]: `Content-Length` framing over any tokio byte stream
//! - [`WebSocketCodec`]: one message per WebSocket frame
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket codec via `tokio-tungstenite`

mod error;
pub mod framing;
mod stream;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use framing::{FrameHeader, FrameReader, FrameWriter, Headers};
pub use stream::{StreamCodec, StreamReader, StreamWriter};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketCodec, WebSocketReader, WebSocketWriter};

use std::fmt;
use std::future::Future;

/// Opaque identifier for one live connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receiving half of a codec: yields one raw message at a time.
pub trait MessageReader: Send + 'static {
    /// Reads the next complete message.
    ///
    /// Any error is fatal to the connection.
    fn read_message(
        &mut self,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Sending half of a codec.
pub trait MessageWriter: Send + 'static {
    /// Writes one complete message.
    fn write_message(
        &mut self,
        message: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection. Called at most once, by whoever owns the
    /// connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }
}

/// A connection that carries raw JSON-RPC messages.
///
/// The client writes requests and reads responses, the server reads
/// requests and writes responses. Splitting into halves lets each half be
/// driven by exactly one task: reads may run concurrently with writes, but
/// never with other reads (and likewise for writes).
pub trait Codec: Send + 'static {
    /// The receiving half.
    type Reader: MessageReader;
    /// The sending half.
    type Writer: MessageWriter;

    /// Splits the connection into its two halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_equality() {
        assert_eq!(ConnectionId::new(1), ConnectionId::new(1));
        assert_ne!(ConnectionId::new(1), ConnectionId::new(2));
    }
}
