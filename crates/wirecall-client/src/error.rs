//! Error types for the client.

use wirecall_protocol::{ErrorCode, ErrorObject, ProtocolError};
use wirecall_transport::TransportError;

/// Errors returned by [`Client`](crate::Client) calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request was rejected before reaching the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection dropped before the call completed. The request may
    /// or may not have reached the server.
    #[error("connection interrupted")]
    Interrupted,

    /// The client has been closed.
    #[error("client closed")]
    Closed,

    /// The caller's cancellation token fired first.
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline passed first.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The server answered with an error object.
    #[error("server error: {0}")]
    Rpc(#[from] ErrorObject),

    /// A message could not be encoded or a result could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A raw write through a [`CodecGuard`](crate::CodecGuard) failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// The JSON-RPC code that best describes this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::INVALID_REQUEST,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCode::REQUEST_CANCELLED,
            Self::Rpc(error) => error.code,
            Self::Interrupted | Self::Closed | Self::Protocol(_) | Self::Transport(_) => {
                ErrorCode::UNKNOWN_ERROR
            }
        }
    }
}
