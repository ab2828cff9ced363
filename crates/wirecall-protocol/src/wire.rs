//! Bytes ↔ message helpers.
//!
//! Codecs move raw byte messages; these functions turn them into the
//! types in [`crate::types`] and back. Parsing happens in two steps so
//! callers can tell the failures apart: bytes that are not JSON at all
//! come back as [`ProtocolError::Decode`], well-formed JSON with the wrong
//! shape as [`ProtocolError::InvalidMessage`].

use serde::Serialize;
use serde_json::Value;

use crate::{ProtocolError, Request, Response};

/// Serializes a message to its JSON bytes.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

/// Parses one inbound request.
///
/// Batch requests (a top-level array) are not supported and come back as
/// `InvalidMessage`.
pub fn decode_request(bytes: &[u8]) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
    Request::from_value(value)
}

/// Parses an inbound response or a batch of responses.
///
/// Batch elements are decoded independently; elements that are not valid
/// responses are dropped and the rest are returned.
pub fn decode_responses(bytes: &[u8]) -> Result<Vec<Response>, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| Response::from_value(item).ok())
            .collect()),
        single => Response::from_value(single).map(|response| vec![response]),
    }
}
