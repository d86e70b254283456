//! Core JSON-RPC 2.0 types, errors and codec for jrd
//!
//! This crate provides the transport-agnostic foundation of the jrd
//! dispatcher:
//!
//! - **Types**: Request/response envelopes, request ids and the `Params` shape
//! - **Codec**: Body decoding that tells parse errors from invalid requests
//! - **Error handling**: One error taxonomy mapped onto JSON-RPC codes and HTTP statuses
//! - **Observability**: `tracing` / OpenTelemetry bootstrap helpers
//!
//! The `jrd-server` crate builds the registry, binder and dispatcher on top.
//!
//! # Example
//!
//! ```rust
//! use jrd_core::{codec, JsonRpcResponse, Id};
//! use serde_json::json;
//!
//! let request = codec::decode_request(br#"{"jsonrpc":"2.0","method":"add","params":[1,2],"id":1}"#).unwrap();
//! assert_eq!(request.method, "add");
//!
//! let response = JsonRpcResponse::success(json!(3), request.id);
//! assert_eq!(codec::encode_response(&response).unwrap(), r#"{"jsonrpc":"2.0","result":3,"id":1}"#);
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{value_type_name, Id, JsonRpcRequest, JsonRpcResponse, Params, JSONRPC_VERSION};
