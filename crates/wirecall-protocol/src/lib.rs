//! JSON-RPC 2.0 envelope model for wirecall.
//!
//! This crate defines the messages that clients and servers exchange:
//!
//! - **Types** ([`Request`], [`Response`], [`RequestId`], [`Outcome`]) are
//!   the structures that travel on the wire.
//! - **Errors** ([`ErrorCode`], [`ErrorObject`], [`RpcError`]) describe
//!   failures reported inside a response; [`ProtocolError`] covers
//!   messages that cannot be decoded at all.
//! - **Wire helpers** ([`encode`], [`decode_request`],
//!   [`decode_responses`]) handle conversion to and from raw message bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw messages) and the
//! client/server. It knows nothing about connections; it only knows how
//! to turn bytes into envelopes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Request / Response) → Client / Server
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod types;
mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::{ErrorCode, ErrorObject, ProtocolError, RpcError};
pub use types::{JSONRPC_VERSION, Outcome, Request, RequestId, Response};
pub use wire::{decode_request, decode_responses, encode};

/// Method name of the cancellation notification.
pub const CANCEL_METHOD: &str = "$/cancelRequest";
