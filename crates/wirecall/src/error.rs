//! Unified error type for wirecall.

use wirecall_client::ClientError;
use wirecall_protocol::{ProtocolError, RpcError};
use wirecall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `wirecall` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// conversions let `?` lift sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WirecallError {
    /// A transport-level error (framing, connection, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An error returned by a method handler.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A client call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// An I/O error outside a connection, such as binding a listener.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
