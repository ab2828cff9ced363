//! Core JSON-RPC 2.0 types: identifiers, requests, and responses.
//!
//! These are the structures that travel on the wire. The JSON shapes are
//! fixed by JSON-RPC 2.0, so serialization is written by
//! hand where derive would get a detail wrong (a present-but-null `id` is
//! not the same as an absent one, and a response carries exactly one of
//! `result` or `error`).

use std::fmt;

use serde::de::{self, DeserializeOwned, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{ErrorObject, ProtocolError, RpcError};

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Top-level keys owned by the envelope; never copied into `extra`.
const RESERVED_KEYS: [&str; 6] = ["jsonrpc", "id", "method", "params", "result", "error"];

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A request identifier: `null`, an integer, or a string.
///
/// This is a tagged union, so exactly one form is active at a time. The
/// form survives a round trip: `Int(1)` serializes as `1`, never `"1"`,
/// and `Str("1")` as `"1"`, never `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RequestId {
    /// `"id": null`.
    #[default]
    Null,
    /// A JSON integer.
    Int(i64),
    /// A JSON string.
    Str(String),
}

impl RequestId {
    /// Parses an identifier out of a JSON value.
    ///
    /// # Errors
    /// `InvalidMessage` for floats, integers outside `i64`, booleans,
    /// arrays, and objects.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Number(n) => n.as_i64().map(Self::Int).ok_or_else(|| {
                ProtocolError::InvalidMessage(format!(
                    "id must be an integer, got {n}"
                ))
            }),
            Value::String(s) => Ok(Self::Str(s.clone())),
            other => Err(ProtocolError::InvalidMessage(format!(
                "id must be null, an integer, or a string, got {other}"
            ))),
        }
    }

    /// Returns `true` for `RequestId::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RequestIdVisitor)
    }
}

struct RequestIdVisitor;

impl<'de> Visitor<'de> for RequestIdVisitor {
    type Value = RequestId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, an integer, or a string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RequestId, E> {
        Ok(RequestId::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RequestId, E> {
        Ok(RequestId::Null)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RequestId, E> {
        Ok(RequestId::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RequestId, E> {
        i64::try_from(v)
            .map(RequestId::Int)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RequestId, E> {
        Ok(RequestId::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RequestId, E> {
        Ok(RequestId::Str(v))
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A JSON-RPC request or notification.
///
/// `notification == true` means no `id` goes on the wire and no response
/// is expected; `id` is ignored in that case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    /// The method to invoke. Never empty on a valid request.
    pub method: String,
    /// Parameters: absent, a JSON array, or a JSON object.
    pub params: Option<Value>,
    /// `true` for a notification.
    pub notification: bool,
    /// The identifier. Only meaningful when `notification` is `false`.
    pub id: RequestId,
    /// Additional top-level fields, preserved round-trip.
    pub extra: Map<String, Value>,
}

impl Request {
    /// Creates a request (not a notification) with a `null` id.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Creates a notification.
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            notification: true,
            ..Self::default()
        }
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets the identifier.
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds an extra top-level field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Returns `true` if `params` is absent, an array, or an object.
    pub fn has_valid_params(&self) -> bool {
        matches!(self.params, None | Some(Value::Array(_) | Value::Object(_)))
    }

    /// Deserializes the parameters into `T`. Absent params deserialize
    /// from `null`, so `Option<_>` and `()` accept them.
    ///
    /// # Errors
    /// `INVALID_PARAMS` if the params do not fit `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        let params = self.params.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(params)?)
    }

    /// Builds a request from a parsed JSON value, validating its shape.
    ///
    /// # Errors
    /// `InvalidMessage` if the value is not an object, `jsonrpc` is not
    /// `"2.0"`, `method` is missing, empty, or not a string, `id` is
    /// malformed, or `params` is neither an array nor an object.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut map = match value {
            Value::Object(map) => map,
            Value::Array(_) => {
                return Err(ProtocolError::InvalidMessage(
                    "batch requests are not supported".into(),
                ));
            }
            _ => {
                return Err(ProtocolError::InvalidMessage(
                    "request must be a JSON object".into(),
                ));
            }
        };

        check_version(map.remove("jsonrpc"))?;

        let method = match map.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => {
                return Err(ProtocolError::InvalidMessage(
                    "method must be a non-empty string".into(),
                ));
            }
        };

        let params = match map.remove("params") {
            None => None,
            Some(params @ (Value::Array(_) | Value::Object(_))) => Some(params),
            Some(_) => {
                return Err(ProtocolError::InvalidMessage(
                    "params must be an array or an object".into(),
                ));
            }
        };

        let (notification, id) = match map.remove("id") {
            None => (true, RequestId::Null),
            Some(id) => (false, RequestId::from_value(&id)?),
        };

        Ok(Self {
            method,
            params,
            notification,
            id,
            extra: map,
        })
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        if !self.notification {
            map.serialize_entry("id", &self.id)?;
        }
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        serialize_extra(&mut map, &self.extra)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// The payload of a response: a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Success; the value may be `null`.
    Result(Value),
    /// Failure.
    Error(ErrorObject),
}

/// A JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The identifier of the request this answers.
    pub id: RequestId,
    /// Result or error.
    pub outcome: Outcome,
    /// Additional top-level fields, preserved round-trip.
    pub extra: Map<String, Value>,
}

impl Response {
    /// A successful response.
    pub fn result(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Result(result),
            extra: Map::new(),
        }
    }

    /// A failed response.
    pub fn error(id: impl Into<RequestId>, error: ErrorObject) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Error(error),
            extra: Map::new(),
        }
    }

    /// A successful response whose id is filled in later, for handlers.
    pub fn ok(result: Value) -> Self {
        Self::result(RequestId::Null, result)
    }

    /// A `null` result, for handlers with nothing to return.
    pub fn null() -> Self {
        Self::ok(Value::Null)
    }

    /// Adds an extra top-level field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Returns `true` if the outcome is an error.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Converts the outcome into a `Result`.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }

    /// Builds a response from a parsed JSON value, validating its shape.
    ///
    /// An explicit `"error": null` next to a `result` is tolerated, and so
    /// is `"result": null` next to an `error`.
    ///
    /// # Errors
    /// `InvalidMessage` if the value is not an object, `jsonrpc` is not
    /// `"2.0"`, `id` is missing or malformed, or the object does not carry
    /// exactly one of `result` and `error`. `Decode` if the error object
    /// is malformed.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::InvalidMessage(
                "response must be a JSON object".into(),
            ));
        };

        check_version(map.remove("jsonrpc"))?;

        let id = match map.remove("id") {
            Some(id) => RequestId::from_value(&id)?,
            None => {
                return Err(ProtocolError::InvalidMessage(
                    "response is missing an id".into(),
                ));
            }
        };

        let outcome = match (map.remove("result"), map.remove("error")) {
            (Some(result), None | Some(Value::Null)) => Outcome::Result(result),
            (None | Some(Value::Null), Some(error)) => Outcome::Error(
                serde_json::from_value(error).map_err(ProtocolError::Decode)?,
            ),
            _ => {
                return Err(ProtocolError::InvalidMessage(
                    "response must carry exactly one of result or error".into(),
                ));
            }
        };

        Ok(Self {
            id,
            outcome,
            extra: map,
        })
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            Outcome::Result(result) => map.serialize_entry("result", result)?,
            Outcome::Error(error) => map.serialize_entry("error", error)?,
        }
        serialize_extra(&mut map, &self.extra)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_version(version: Option<Value>) -> Result<(), ProtocolError> {
    match version {
        Some(Value::String(v)) if v == JSONRPC_VERSION => Ok(()),
        _ => Err(ProtocolError::InvalidMessage(
            "jsonrpc must be \"2.0\"".into(),
        )),
    }
}

fn serialize_extra<M: SerializeMap>(
    map: &mut M,
    extra: &Map<String, Value>,
) -> Result<(), M::Error> {
    for (key, value) in extra {
        if !RESERVED_KEYS.contains(&key.as_str()) {
            map.serialize_entry(key, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    //! JSON-RPC 2.0 fixes the exact JSON shapes, so these tests check
    //! the serialized form directly rather than only round-tripping.

    use serde_json::json;

    use super::*;
    use crate::ErrorCode;

    // =====================================================================
    // RequestId
    // =====================================================================

    #[test]
    fn test_request_id_forms_round_trip() {
        for id in [
            RequestId::Null,
            RequestId::Int(0),
            RequestId::Int(i64::MIN),
            RequestId::Int(i64::MAX),
            RequestId::Str(String::new()),
            RequestId::Str("42".into()),
        ] {
            let json = serde_json::to_string(&id).unwrap();
            let back: RequestId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id, "round trip of {json}");
        }
    }

    #[test]
    fn test_int_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&RequestId::Int(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&RequestId::Str("7".into())).unwrap(),
            "\"7\""
        );
        assert_eq!(serde_json::to_string(&RequestId::Null).unwrap(), "null");
    }

    #[test]
    fn test_numeric_string_stays_a_string() {
        let id: RequestId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(id, RequestId::Str("7".into()));
        assert_ne!(id, RequestId::Int(7));
    }

    #[test]
    fn test_malformed_ids_rejected() {
        for bad in ["1.5", "true", "[1]", "{}", "18446744073709551615"] {
            assert!(
                serde_json::from_str::<RequestId>(bad).is_err(),
                "{bad} should not parse as an id"
            );
        }
    }

    // =====================================================================
    // Request
    // =====================================================================

    #[test]
    fn test_request_serializes_expected_shape() {
        let request = Request::new("sum")
            .with_id(1)
            .with_params(json!([1, 2]));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "method": "sum", "params": [1, 2]})
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let request = Request::notification("exit").with_id(5);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "exit"}));
    }

    #[test]
    fn test_absent_id_is_notification_null_id_is_not() {
        let note = Request::from_value(json!({"jsonrpc": "2.0", "method": "m"})).unwrap();
        assert!(note.notification);

        let call = Request::from_value(json!({"jsonrpc": "2.0", "method": "m", "id": null}))
            .unwrap();
        assert!(!call.notification);
        assert_eq!(call.id, RequestId::Null);
    }

    #[test]
    fn test_request_extra_fields_preserved() {
        let input = json!({
            "jsonrpc": "2.0",
            "id": "a",
            "method": "m",
            "trace": {"span": 3}
        });
        let request: Request = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(request.extra.get("trace"), Some(&json!({"span": 3})));
        assert_eq!(serde_json::to_value(&request).unwrap(), input);
    }

    #[test]
    fn test_request_shape_errors() {
        let cases = [
            json!([]),
            json!("x"),
            json!({"method": "m"}),
            json!({"jsonrpc": "1.0", "method": "m"}),
            json!({"jsonrpc": "2.0", "method": 3}),
            json!({"jsonrpc": "2.0", "method": ""}),
            json!({"jsonrpc": "2.0", "method": "m", "id": 1.5}),
            json!({"jsonrpc": "2.0", "method": "m", "params": 3}),
            json!({"jsonrpc": "2.0", "method": "m", "params": null}),
        ];
        for case in cases {
            assert!(
                matches!(
                    Request::from_value(case.clone()),
                    Err(ProtocolError::InvalidMessage(_))
                ),
                "{case} should be invalid"
            );
        }
    }

    #[test]
    fn test_has_valid_params() {
        assert!(Request::new("m").has_valid_params());
        assert!(Request::new("m").with_params(json!({})).has_valid_params());
        assert!(!Request::new("m").with_params(json!(1)).has_valid_params());
    }

    #[test]
    fn test_params_as() {
        let request = Request::new("m").with_params(json!({"a": 1}));
        let parsed: std::collections::HashMap<String, i32> = request.params_as().unwrap();
        assert_eq!(parsed["a"], 1);

        let err = request.params_as::<Vec<i32>>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_PARAMS);

        let none: Option<Vec<i32>> = Request::new("m").params_as().unwrap();
        assert!(none.is_none());
    }

    // =====================================================================
    // Response
    // =====================================================================

    #[test]
    fn test_response_result_shape() {
        let response = Response::result(1, Value::Null);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "id": 1, "result": null})
        );
    }

    #[test]
    fn test_response_error_shape() {
        let response = Response::error(
            "1",
            ErrorObject::new(ErrorCode::METHOD_NOT_FOUND, "unknown method \"foobar\""),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": "1",
                "error": {"code": -32601, "message": "unknown method \"foobar\""}
            })
        );
    }

    #[test]
    fn test_response_requires_exactly_one_outcome() {
        let both = json!({"jsonrpc": "2.0", "id": 1, "result": 1, "error": {"code": 1, "message": "x"}});
        let neither = json!({"jsonrpc": "2.0", "id": 1});
        assert!(Response::from_value(both).is_err());
        assert!(Response::from_value(neither).is_err());
    }

    #[test]
    fn test_response_tolerates_null_error_next_to_result() {
        let response =
            Response::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": 2, "error": null}))
                .unwrap();
        assert_eq!(response.outcome, Outcome::Result(json!(2)));
    }

    #[test]
    fn test_response_tolerates_null_result_next_to_error() {
        let response = Response::from_value(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": null,
            "error": {"code": -32603, "message": "boom"}
        }))
        .unwrap();
        let Outcome::Error(error) = response.outcome else {
            panic!("expected an error outcome");
        };
        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_response_requires_id() {
        let result = Response::from_value(json!({"jsonrpc": "2.0", "result": 1}));
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_response_into_result() {
        let err = Response::error(1, ErrorObject::new(ErrorCode::INTERNAL_ERROR, "boom"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(Response::ok(json!(3)).into_result().unwrap(), json!(3));
    }
}
