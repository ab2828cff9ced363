//! Error types for the protocol layer.
//!
//! Two kinds of error live here. [`ProtocolError`] is what goes wrong
//! while turning bytes into messages. [`ErrorObject`], [`ErrorCode`], and
//! [`RpcError`] describe failures that travel *inside* a JSON-RPC response:
//! a handler returns an `RpcError`, the server turns it into an
//! `ErrorObject`, and the client hands that object back to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON, or a nested value has the wrong
    /// type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The JSON parsed but violates JSON-RPC framing rules: wrong version,
    /// missing method, a float id, and so on.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// The JSON-RPC code a peer should see for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Encode(_) => ErrorCode::INTERNAL_ERROR,
            Self::Decode(_) => ErrorCode::PARSE_ERROR,
            Self::InvalidMessage(_) => ErrorCode::INVALID_REQUEST,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// A JSON-RPC error code.
///
/// Any `i64` is allowed on the wire; the associated constants name the
/// reserved ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: Self = Self(-32700);
    /// The JSON is not a valid request object.
    pub const INVALID_REQUEST: Self = Self(-32600);
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    /// Invalid method parameters.
    pub const INVALID_PARAMS: Self = Self(-32602);
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: Self = Self(-32603);
    /// A handler failed without saying how.
    pub const UNKNOWN_ERROR: Self = Self(-32001);
    /// The request was cancelled before it finished.
    pub const REQUEST_CANCELLED: Self = Self(-32800);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

// ---------------------------------------------------------------------------
// ErrorObject
// ---------------------------------------------------------------------------

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error object without data.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// An error returned by a method handler.
///
/// Handlers either pick a code themselves ([`RpcError::Coded`], usually via
/// [`RpcError::new`]) or return something uncoded and let the server pick:
/// cancellation maps to `REQUEST_CANCELLED`, anything else to
/// `UNKNOWN_ERROR`.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// An error with an explicit code.
    #[error("{message}")]
    Coded {
        code: ErrorCode,
        message: String,
        data: Option<Value>,
    },

    /// The request's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The handler gave up because a deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Any other failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RpcError {
    /// An error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Coded {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Wraps an arbitrary error; the server reports it as `UNKNOWN_ERROR`.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// `METHOD_NOT_FOUND` for `method`.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("unknown method {method:?}"),
        )
    }

    /// `INVALID_PARAMS` with `message`.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// `INTERNAL_ERROR` with `message`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Attaches data. Uncoded errors become `UNKNOWN_ERROR` first.
    pub fn with_data(self, data: Value) -> Self {
        let code = self.code();
        let message = self.to_string();
        Self::Coded {
            code,
            message,
            data: Some(data),
        }
    }

    /// Re-codes the error, keeping its message and data.
    pub fn with_code(self, code: ErrorCode) -> Self {
        match self {
            Self::Coded { message, data, .. } => Self::Coded {
                code,
                message,
                data,
            },
            other => Self::new(code, other.to_string()),
        }
    }

    /// The code a client will see.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Coded { code, .. } => *code,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCode::REQUEST_CANCELLED,
            Self::Other(_) => ErrorCode::UNKNOWN_ERROR,
        }
    }

    /// Builds the wire form.
    pub fn to_error_object(&self) -> ErrorObject {
        let data = match self {
            Self::Coded { data, .. } => data.clone(),
            _ => None,
        };
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<ErrorObject> for RpcError {
    fn from(obj: ErrorObject) -> Self {
        Self::Coded {
            code: obj.code,
            message: obj.message,
            data: obj.data,
        }
    }
}

impl From<RpcError> for ErrorObject {
    fn from(err: RpcError) -> Self {
        err.to_error_object()
    }
}

/// Parameter decoding failures are the caller's fault.
impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_params(err.to_string())
    }
}
