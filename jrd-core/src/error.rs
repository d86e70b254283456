//! Error types for jrd
//!
//! This module provides the error taxonomy shared by every stage of the
//! dispatcher. It defines two main error types:
//!
//! - **Error**: Rich internal errors (uses thiserror), returned by the
//!   binder, the auth hook, the registry and by procedures themselves
//! - **JsonRpcErrorData**: The wire-format error object of a response
//!
//! # Error Codes
//!
//! - `-32700`: Parse error (invalid JSON body)
//! - `-32600`: Invalid request (malformed envelope)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params (binding, validation, credential shape)
//! - `-32603`: Internal error
//! - `-32001`: Invalid credentials (auth check rejected the caller)
//! - `-32000 to -32099`: Application errors raised by procedures, except
//!   `-32001` which stays reserved for credentials
//!
//! Registration-time errors (`DuplicateMethod`, `Signature`,
//! `Configuration`) never reach the wire; they surface at startup.
//!
//! # Examples
//!
//! ```rust
//! use jrd_core::{Error, JsonRpcErrorData};
//!
//! let error = Error::MethodNotFound("App.missing".into());
//! let wire = error.to_error_data();
//! assert_eq!(wire.code, -32601);
//! assert_eq!(error.http_status(), 400);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for jrd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error code for a JSON body that could not be parsed
pub const PARSE_ERROR: i32 = -32700;
/// Error code for a structurally malformed envelope
pub const INVALID_REQUEST: i32 = -32600;
/// Error code for an unregistered method name
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Error code for binding, validation and credential-shape failures
pub const INVALID_PARAMS: i32 = -32602;
/// Error code for unexpected failures during invocation
pub const INTERNAL_ERROR: i32 = -32603;
/// Error code used when the auth check rejects the caller
pub const INVALID_CREDENTIALS: i32 = -32001;
/// Default application ("server") error code
pub const SERVER_ERROR: i32 = -32000;
/// Lowest code of the application error range
pub const SERVER_ERROR_MIN: i32 = -32099;

/// Application-level error type for jrd operations
///
/// Every failure the dispatcher can observe is one of these variants. The
/// dispatcher never inspects error *messages*; it maps variants to wire
/// codes through [`Error::to_error_data`] and to HTTP statuses through
/// [`Error::http_status`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A structured JSON-RPC error produced by a procedure
    ///
    /// Passed through to the caller verbatim.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// The request body is not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// The envelope is not a valid JSON-RPC 2.0 request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No method is registered under the requested name
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The wire params could not be bound onto the method's signature
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A bound value does not match the declared parameter type
    #[error("Invalid params: parameter '{param}' expected {expected}, got {actual}")]
    ParamType {
        /// Name of the offending parameter
        param: String,
        /// Description of the declared type
        expected: String,
        /// Description of the supplied value's type
        actual: String,
    },

    /// The auth check rejected the supplied credentials
    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    /// A domain-specific failure signalled by a procedure
    ///
    /// The code always lies in the `-32000..=-32099` range and is never
    /// [`INVALID_CREDENTIALS`].
    #[error("Application error [{code}]: {message}")]
    Application {
        /// Error code in the application range
        code: i32,
        /// Human-readable description
        message: String,
        /// Optional structured detail
        data: Option<Value>,
    },

    /// Unexpected failure while invoking a procedure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Input/output error (transport binding)
    #[error("IO error: {0}")]
    Io(String),

    /// A method with this name is already registered
    #[error("Method '{0}' is already registered")]
    DuplicateMethod(String),

    /// A procedure signature is malformed
    #[error("Signature error: {0}")]
    Signature(String),

    /// Startup configuration is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an application error with the default code (-32000)
    ///
    /// This is how a procedure reports "this call failed for a domain
    /// reason" (e.g. `number is odd`) without picking a specific code.
    pub fn application(message: impl Into<String>) -> Self {
        Self::application_with_code(SERVER_ERROR, message)
    }

    /// Create an application error with a specific code
    ///
    /// Codes outside `-32000..=-32099`, and `-32001`, are clamped to `-32000`.
    pub fn application_with_code(code: i32, message: impl Into<String>) -> Self {
        let in_range = (SERVER_ERROR_MIN..=SERVER_ERROR).contains(&code);
        let code = if in_range && code != INVALID_CREDENTIALS {
            code
        } else {
            SERVER_ERROR
        };
        Error::Application {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail to an application error
    ///
    /// Other variants are returned unchanged.
    pub fn with_data(self, data: Value) -> Self {
        match self {
            Error::Application { code, message, .. } => Error::Application {
                code,
                message,
                data: Some(data),
            },
            other => other,
        }
    }

    /// Map this error onto the wire-format error object
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        match self {
            Error::JsonRpc(data) => data.clone(),
            Error::Parse(msg) => {
                JsonRpcErrorData::with_data(PARSE_ERROR, "Parse error", json!({ "message": msg }))
            }
            Error::InvalidRequest(msg) => JsonRpcErrorData::invalid_request(msg.clone()),
            Error::MethodNotFound(method) => JsonRpcErrorData::method_not_found(method.clone()),
            Error::InvalidParams(msg) => JsonRpcErrorData::invalid_params(msg.clone()),
            Error::ParamType {
                param,
                expected,
                actual,
            } => JsonRpcErrorData::with_data(
                INVALID_PARAMS,
                self.to_string(),
                json!({ "param": param, "expected": expected, "actual": actual }),
            ),
            Error::InvalidCredentials => JsonRpcErrorData::invalid_credentials(),
            Error::Application {
                code,
                message,
                data,
            } => JsonRpcErrorData {
                code: *code,
                message: "Server error".to_string(),
                data: Some(match data {
                    Some(extra) => json!({ "message": message, "detail": extra }),
                    None => json!({ "message": message }),
                }),
            },
            Error::Internal(msg) | Error::Serialization(msg) | Error::Io(msg) => {
                JsonRpcErrorData::internal_error(msg.clone())
            }
            Error::DuplicateMethod(_) | Error::Signature(_) | Error::Configuration(_) => {
                JsonRpcErrorData::internal_error(self.to_string())
            }
        }
    }

    /// HTTP status code the response encoder uses for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Error::JsonRpc(data) => data.http_status(),
            Error::Parse(_)
            | Error::InvalidRequest(_)
            | Error::MethodNotFound(_)
            | Error::InvalidParams(_)
            | Error::ParamType { .. } => 400,
            Error::InvalidCredentials => 401,
            _ => 500,
        }
    }

    /// True for failures caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

/// JSON-RPC 2.0 error object as defined in the specification
///
/// This structure represents the exact wire format for JSON-RPC errors.
/// It appears in the `error` field of a `JsonRpcResponse`.
///
/// # Examples
///
/// ```rust
/// use jrd_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::method_not_found("calculate");
/// assert_eq!(error.code, -32601);
///
/// let custom = JsonRpcErrorData::with_data(
///     -32010,
///     "Insufficient funds",
///     json!({"balance": 50, "required": 100})
/// );
/// assert!(custom.data.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code indicating the error type
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Create a new JSON-RPC error with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new JSON-RPC error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a parse error (-32700)
    ///
    /// Per spec: "Invalid JSON was received by the server."
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Create an invalid request error (-32600)
    ///
    /// Per spec: "The JSON sent is not a valid Request object."
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// Create a method not found error (-32601)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jrd_core::JsonRpcErrorData;
    ///
    /// let error = JsonRpcErrorData::method_not_found("App.missing");
    /// assert_eq!(error.message, "Method not found: App.missing");
    /// ```
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method.into()))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Create an invalid credentials error (-32001)
    pub fn invalid_credentials() -> Self {
        Self::new(INVALID_CREDENTIALS, "Invalid authentication credentials")
    }

    /// HTTP status for a structured error passed through from a procedure
    pub fn http_status(&self) -> u16 {
        match self.code {
            PARSE_ERROR | INVALID_REQUEST | METHOD_NOT_FOUND | INVALID_PARAMS => 400,
            INVALID_CREDENTIALS => 401,
            _ => 500,
        }
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message", e.g. "[-32601] Method not found: x"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_jsonrpc_error_codes() {
        let errors = vec![
            (Error::Parse("eof".into()), PARSE_ERROR),
            (Error::InvalidRequest("test".into()), INVALID_REQUEST),
            (Error::MethodNotFound("test".into()), METHOD_NOT_FOUND),
            (Error::InvalidParams("test".into()), INVALID_PARAMS),
            (Error::Internal("test".into()), INTERNAL_ERROR),
            (Error::InvalidCredentials, INVALID_CREDENTIALS),
            (Error::application("number is odd"), SERVER_ERROR),
        ];

        for (error, expected_code) in errors {
            let data = error.to_error_data();
            assert_eq!(data.code, expected_code);
            assert!(!data.message.is_empty());
        }
    }

    #[test]
    fn test_param_type_error_carries_detail() {
        let error = Error::ParamType {
            param: "n".into(),
            expected: "integer".into(),
            actual: "string".into(),
        };
        let data = error.to_error_data();

        assert_eq!(data.code, INVALID_PARAMS);
        assert!(data.message.contains("'n'"));
        let detail = data.data.unwrap();
        assert_eq!(detail["param"], "n");
        assert_eq!(detail["expected"], "integer");
        assert_eq!(detail["actual"], "string");
    }

    #[test]
    fn test_application_error_shape() {
        let data = Error::application("number is odd").to_error_data();
        assert_eq!(data.code, -32000);
        assert_eq!(data.message, "Server error");
        assert_eq!(data.data, Some(json!({"message": "number is odd"})));
    }

    #[test]
    fn test_application_code_is_clamped_to_reserved_range() {
        match Error::application_with_code(-32050, "x") {
            Error::Application { code, .. } => assert_eq!(code, -32050),
            other => panic!("unexpected {other:?}"),
        }
        match Error::application_with_code(42, "x") {
            Error::Application { code, .. } => assert_eq!(code, SERVER_ERROR),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_credentials_code_is_not_an_application_code() {
        let error = Error::application_with_code(INVALID_CREDENTIALS, "x");
        assert_eq!(error.to_error_data().code, SERVER_ERROR);
        assert_eq!(error.http_status(), 500);

        assert_eq!(Error::InvalidCredentials.to_error_data().code, INVALID_CREDENTIALS);
        assert_eq!(Error::InvalidCredentials.http_status(), 401);
        let typed: Error = JsonRpcErrorData::invalid_credentials().into();
        assert_eq!(typed.http_status(), 401);
    }

    #[test]
    fn test_application_error_with_data() {
        let data = Error::application_with_code(-32010, "insufficient funds")
            .with_data(json!({"balance": 5}))
            .to_error_data();
        assert_eq!(data.code, -32010);
        assert_eq!(data.data.unwrap()["detail"]["balance"], 5);
    }

    #[test]
    fn test_typed_error_passes_through() {
        let typed = JsonRpcErrorData::with_data(-32042, "Quota exceeded", json!({"limit": 3}));
        let error: Error = typed.clone().into();
        assert_eq!(error.to_error_data(), typed);
        assert_eq!(error.http_status(), 500);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::Parse("x".into()).http_status(), 400);
        assert_eq!(Error::MethodNotFound("x".into()).http_status(), 400);
        assert_eq!(Error::InvalidCredentials.http_status(), 401);
        assert_eq!(Error::Internal("x".into()).http_status(), 500);
        assert!(Error::InvalidParams("x".into()).is_client_error());
        assert!(!Error::application("x").is_client_error());
    }

    #[test]
    fn test_jsonrpc_error_display() {
        let error = JsonRpcErrorData::method_not_found("unknownMethod");
        let display = format!("{}", error);

        assert!(display.contains("-32601"));
        assert!(display.contains("Method not found"));
    }

    #[test]
    fn test_error_with_data_serialization() {
        let error = JsonRpcErrorData::with_data(-32000, "Test error", json!({"key": "value"}));

        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: JsonRpcErrorData = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, error);
    }

    #[test]
    fn test_error_without_data_omits_field() {
        let serialized = serde_json::to_string(&JsonRpcErrorData::invalid_params("x")).unwrap();
        assert!(!serialized.contains("data"));
    }
}
