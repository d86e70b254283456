//! JSON-RPC 2.0 types as seen by the dispatcher
//!
//! This module implements the envelope structures from the JSON-RPC 2.0
//! specification (https://www.jsonrpc.org/specification) together with the
//! `Params` shape the binder works on. These types are designed to be:
//!
//! - **Spec-compliant**: Strict adherence to JSON-RPC 2.0 requirements
//! - **Type-safe**: Calls and notifications share one request type, told apart by `id`
//! - **Serializable**: Full serde support for JSON encoding/decoding
//!
//! # Calls vs Notifications
//!
//! A request carrying an `id` member is a *call* and always gets a response
//! whose `id` echoes it, even when that id is `null`. A request without an
//! `id` member is a *notification*: the caller expects no response body.

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// The only protocol version the dispatcher speaks
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID
///
/// The request identifier is used to correlate a request with its
/// response. Numbers are kept as `serde_json::Number`, so `1.0` or
/// `18446744073709551615` come back exactly as sent. `Null` is an id that
/// was present but `null`; it still marks a call, not a notification.
///
/// # Examples
///
/// ```rust
/// use jrd_core::Id;
///
/// let id1: Id = "req-123".into();
/// let id2: Id = 42i64.into();
/// let id3: Id = u64::MAX.into();
///
/// assert_eq!(id1.to_string(), "\"req-123\"");
/// assert_eq!(id2.to_string(), "42");
/// assert_eq!(id3.to_string(), "18446744073709551615");
/// assert_eq!(Id::Null.to_string(), "null");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier - useful for UUIDs or correlation tokens
    String(String),
    /// Numeric identifier, integer or not
    Number(Number),
    /// `"id": null`
    Null,
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => f.write_str("null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n.into())
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n.into())
    }
}

impl From<Number> for Id {
    fn from(n: Number) -> Self {
        Id::Number(n)
    }
}

/// JSON-RPC 2.0 request message
///
/// One inbound request, either a call (`id` member present, possibly
/// `null`) or a notification (`id` member absent). The `params` field is kept as raw JSON here and turned
/// into [`Params`] by the dispatcher, so that a malformed params value can
/// be reported with the request's `id`.
///
/// # Examples
///
/// ```rust
/// use jrd_core::{JsonRpcRequest, Id};
/// use serde_json::json;
///
/// let call = JsonRpcRequest::new("App.echo", Some(json!(["World"])), Id::from(1i64));
/// assert!(!call.is_notification());
///
/// let notif = JsonRpcRequest::notification("jsonrpc.notify", Some(json!([])));
/// assert!(notif.is_notification());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// Name of the registered method to invoke
    pub method: String,
    /// Optional parameters, an array or an object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id; `None` (member absent) marks a notification
    #[serde(
        default,
        deserialize_with = "deserialize_present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Id>,
}

/// `Option<Id>` would read `null` as `None`; a present member is always `Some`
fn deserialize_present_id<'de, D>(deserializer: D) -> std::result::Result<Option<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    Id::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Create a call that expects a response
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Create a notification (no `id`, no response expected)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// True when the request has no `id` member
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Wire parameters in the shape the binder understands
///
/// JSON-RPC allows params to be omitted, passed by position (array) or
/// passed by name (object). Anything else is not a valid request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No `params` member (or `null`)
    #[default]
    Absent,
    /// Positional parameters
    Positional(Vec<Value>),
    /// Named parameters
    Named(Map<String, Value>),
}

impl Params {
    /// Classify a raw `params` member
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` for scalar params (strings, numbers,
    /// booleans), which JSON-RPC 2.0 does not allow.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jrd_core::Params;
    /// use serde_json::json;
    ///
    /// assert_eq!(Params::from_value(None).unwrap(), Params::Absent);
    /// assert!(matches!(Params::from_value(Some(json!([1]))).unwrap(), Params::Positional(_)));
    /// assert!(Params::from_value(Some(json!("nope"))).is_err());
    /// ```
    pub fn from_value(value: Option<Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Params::Absent),
            Some(Value::Array(items)) => Ok(Params::Positional(items)),
            Some(Value::Object(map)) => Ok(Params::Named(map)),
            Some(other) => Err(Error::InvalidRequest(format!(
                "params must be an array or an object, got {}",
                value_type_name(&other)
            ))),
        }
    }

    /// Number of supplied values
    pub fn len(&self) -> usize {
        match self {
            Params::Absent => 0,
            Params::Positional(items) => items.len(),
            Params::Named(map) => map.len(),
        }
    }

    /// True when nothing was supplied (absent, `[]` or `{}`)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert back to raw JSON (used for logging and middleware)
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Params::Absent => None,
            Params::Positional(items) => Some(Value::Array(items.clone())),
            Params::Named(map) => Some(Value::Object(map.clone())),
        }
    }
}

/// Describe the JSON type of a value (`"string"`, `"integer"`, ...)
///
/// Integers and floats are told apart so that validation errors can say
/// `expected integer, got number` for `1.5`.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON-RPC 2.0 response message
///
/// A response carries either a `result` or an `error`, never both. The `id`
/// echoes the request's id; it serializes as `null` when the request id
/// was `null` or could not be determined (parse errors, invalid envelopes, echoed
/// notification errors).
///
/// # Examples
///
/// ```rust
/// use jrd_core::{JsonRpcResponse, JsonRpcErrorData, Id};
/// use serde_json::json;
///
/// let success = JsonRpcResponse::success(json!("Hello World"), Some(Id::from(1i64)));
/// assert!(success.is_success());
///
/// let error = JsonRpcResponse::error(JsonRpcErrorData::method_not_found("nope"), None);
/// assert!(error.is_error());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// The result of the method invocation (present only on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information (present only on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    /// Request ID from the original request, `null` when unknown
    pub id: Option<Id>,
}

impl JsonRpcResponse {
    /// Create a successful JSON-RPC 2.0 response
    pub fn success(result: Value, id: Option<Id>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error JSON-RPC 2.0 response
    pub fn error(error: JsonRpcErrorData, id: Option<Id>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Check if the response represents a successful result
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Check if the response represents an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_display() {
        assert_eq!(Id::String("test".to_string()).to_string(), "\"test\"");
        assert_eq!(Id::from(42i64).to_string(), "42");
        assert_eq!(Id::Null.to_string(), "null");
    }

    #[test]
    fn test_request_without_id_is_notification() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"jsonrpc.notify","params":[]}"#)
                .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn test_null_id_is_a_call() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"m","id":null}"#).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(Id::Null));

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert!(json.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn test_numeric_ids_round_trip() {
        for raw in ["1.0", "18446744073709551615", "-7", "2.5e3"] {
            let text = format!(r#"{{"jsonrpc":"2.0","method":"m","id":{}}}"#, raw);
            let req: JsonRpcRequest = serde_json::from_str(&text).unwrap();
            let expected: Value = serde_json::from_str(raw).unwrap();
            let resp = JsonRpcResponse::success(Value::Null, req.id);
            assert_eq!(serde_json::to_value(&resp).unwrap()["id"], expected);
        }
        assert_eq!(
            serde_json::to_value(Id::from(u64::MAX)).unwrap(),
            json!(u64::MAX)
        );
    }

    #[test]
    fn test_request_ids_deserialize() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"m","id":"abc"}"#).unwrap();
        assert_eq!(req.id, Some(Id::String("abc".into())));

        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"m","id":7}"#).unwrap();
        assert_eq!(req.id, Some(Id::from(7i64)));
    }

    #[test]
    fn test_notification_serialization_omits_id() {
        let notif = JsonRpcRequest::notification("notify", None);
        let json = serde_json::to_string(&notif).unwrap();
        assert!(json.contains("\"method\":\"notify\""));
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_params_shapes() {
        assert_eq!(Params::from_value(Some(Value::Null)).unwrap(), Params::Absent);
        assert!(Params::from_value(Some(json!([]))).unwrap().is_empty());
        assert!(Params::from_value(Some(json!({}))).unwrap().is_empty());

        let named = Params::from_value(Some(json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(named.len(), 2);
        assert_eq!(named.to_value(), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_scalar_params_rejected() {
        let err = Params::from_value(Some(json!(3))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_error_response_serializes_null_id() {
        let resp = JsonRpcResponse::error(JsonRpcErrorData::parse_error(), None);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_success_response_shape() {
        let resp = JsonRpcResponse::success(json!("Hello World"), Some(Id::from(1i64)));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "result": "Hello World", "id": 1})
        );
    }

    #[test]
    fn test_null_result_is_still_success() {
        let resp = JsonRpcResponse::success(Value::Null, Some(Id::from(3i64)));
        assert!(resp.is_success());
        let value = serde_json::to_value(&resp).unwrap();
        // `result: null` must survive serialization (skip only skips None)
        assert!(value.get("result").is_some());
    }
}
