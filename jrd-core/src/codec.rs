//! Codec for JSON-RPC envelopes
//!
//! The HTTP layer hands the dispatcher raw body bytes; this module turns
//! them into a validated [`JsonRpcRequest`] or into a precise rejection,
//! and turns responses back into JSON text.
//!
//! # Why not plain serde?
//!
//! Deriving `Deserialize` alone cannot tell a *parse error* (the body is
//! not JSON, `-32700`) from an *invalid request* (valid JSON, wrong shape,
//! `-32600`), and it loses the request `id` whenever any other member is
//! malformed. Decoding goes through `serde_json::Value` first so that the
//! rejection can still echo the id when one was readable.
//!
//! # Batches
//!
//! JSON arrays are batch requests. The dispatcher does not implement batch
//! semantics, so an array is rejected as an invalid request.
//!
//! # Examples
//!
//! ```rust
//! use jrd_core::{codec, Id};
//!
//! let request = codec::decode_request(br#"{"jsonrpc":"2.0","method":"App.echo","params":["World"],"id":1}"#).unwrap();
//! assert_eq!(request.method, "App.echo");
//! assert_eq!(request.id, Some(Id::from(1i64)));
//!
//! let rejected = codec::decode_request(b"{not json").unwrap_err();
//! assert_eq!(rejected.error.to_error_data().code, -32700);
//! ```

use crate::error::{Error, Result};
use crate::types::{value_type_name, Id, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use serde::Serialize;
use serde_json::Value;

/// A body that could not be decoded into a request
///
/// Carries the id when it could be recovered so the error response can
/// still echo it.
#[derive(Debug, Clone)]
pub struct Rejected {
    /// Why the body was rejected (`Parse` or `InvalidRequest`)
    pub error: Error,
    /// The request id, when it was readable
    pub id: Option<Id>,
}

impl Rejected {
    fn new(error: Error, id: Option<Id>) -> Self {
        Self { error, id }
    }
}

/// Encode any serializable message to a JSON string
///
/// # Errors
///
/// Returns `Error::Serialization` if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a JSON-RPC response to JSON
pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

/// Decode a raw HTTP body into a single JSON-RPC request
///
/// # Validation
///
/// - Invalid JSON → `Error::Parse` (-32700)
/// - Arrays (batches), non-objects → `Error::InvalidRequest` (-32600)
/// - `jsonrpc` missing or not `"2.0"` → `Error::InvalidRequest`
/// - `method` missing or not a string → `Error::InvalidRequest`
/// - `id` present but not a string, number or `null` → `Error::InvalidRequest`
///
/// An `id` member set to `null` yields `Some(Id::Null)`: the request is a
/// call, not a notification.
///
/// `params` is not inspected here; its shape is checked by the dispatcher
/// so that the error can be reported against a known method.
pub fn decode_request(data: &[u8]) -> std::result::Result<JsonRpcRequest, Rejected> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| Rejected::new(Error::Parse(e.to_string()), None))?;

    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(Rejected::new(
                Error::InvalidRequest("Batch requests are not supported".to_string()),
                None,
            ))
        }
        other => {
            return Err(Rejected::new(
                Error::InvalidRequest(format!(
                    "Request must be a JSON object, got {}",
                    value_type_name(&other)
                )),
                None,
            ))
        }
    };

    // Recover the id first so every later rejection can echo it
    let id = match object.remove("id") {
        None => None,
        Some(Value::Null) => Some(Id::Null),
        Some(Value::String(s)) => Some(Id::String(s)),
        Some(Value::Number(n)) => Some(Id::Number(n)),
        Some(other) => {
            return Err(Rejected::new(
                Error::InvalidRequest(format!(
                    "id must be a string, a number or null, got {}",
                    value_type_name(&other)
                )),
                None,
            ))
        }
    };

    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(Rejected::new(
                Error::InvalidRequest(format!("jsonrpc must be \"{}\"", JSONRPC_VERSION)),
                id,
            ))
        }
        None => {
            return Err(Rejected::new(
                Error::InvalidRequest("Missing 'jsonrpc' member".to_string()),
                id,
            ))
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => {
            return Err(Rejected::new(
                Error::InvalidRequest("method must be a string".to_string()),
                id,
            ))
        }
        None => {
            return Err(Rejected::new(
                Error::InvalidRequest("Missing 'method' member".to_string()),
                id,
            ))
        }
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method,
        params: object.remove("params"),
        id,
    })
}
