/// Errors that can occur in the transport layer.
///
/// Every variant is fatal to the connection it came from: the client
/// reconnects, the server dispatcher returns.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Establishing a connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The stream ended in the middle of a header block or body.
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// A header line could not be parsed.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A header key or value contains bytes that would corrupt framing.
    #[error("invalid header {0:?}: keys and values must not contain line breaks")]
    InvalidHeader(String),

    /// The message has no usable `Content-Length` header.
    #[error("missing or invalid Content-Length header")]
    MissingContentLength,

    /// The declared body is larger than the configured maximum.
    #[error("message size {size} exceeds maximum {max} bytes")]
    MessageTooLarge {
        /// Declared body length.
        size: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The body stream produced fewer bytes than `Content-Length` declared.
    #[error("short write: declared {expected} body bytes, wrote {written}")]
    ShortWrite {
        /// Declared body length.
        expected: u64,
        /// Bytes actually copied.
        written: u64,
    },

    /// A previous write failed; the writer refuses further messages.
    #[error("writer failed earlier and accepts no more messages")]
    WriterPoisoned,

    /// `unread_byte` was called without a preceding body read.
    #[error("unread_byte is only valid immediately after a body read")]
    InvalidUnread,
}

impl TransportError {
    /// Returns `true` if the error is a clean end of the connection rather
    /// than a failure in the middle of a message.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }
}
