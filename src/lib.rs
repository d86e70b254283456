//! JRD - JSON-RPC 2.0 dispatcher over HTTP
//!
//! This is the convenience crate that re-exports the jrd sub-crates, so a
//! single dependency gives access to the whole dispatcher.
//!
//! # Architecture
//!
//! - **jrd-core**: Wire types, params shape, codec, error taxonomy, observability
//! - **jrd-server**: Signatures, binder, registry, auth hook, dispatcher, HTTP binding
//! - **jrd-macros**: `#[procedure]`, deriving signatures from async functions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jrd::{procedure, JrdServer, MethodOptions, Result};
//!
//! #[procedure]
//! async fn echo(#[default("")] name: &str) -> Result<String> {
//!     Ok(format!("Hello {}", name))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let server = JrdServer::builder()
//!         .bind_str("127.0.0.1:5000")?
//!         .method("App.echo", echo()?, MethodOptions::default())
//!         .build()
//!         .await?;
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! Code generated by `#[procedure]` refers to `::jrd_server`, so crates
//! using the macro depend on `jrd-server` directly as well.

pub use jrd_core as core;
pub use jrd_server as server;

pub use jrd_core::{Error, Id, JsonRpcRequest, JsonRpcResponse, ObservabilityConfig, Params, Result};
pub use jrd_macros::procedure;
pub use jrd_server::{
    from_fn, from_typed_fn, BoundArgs, Dispatcher, JrdServer, MethodOptions, MethodRegistry,
    ParamType, Procedure, Reply, ServerBuilder, Signature,
};
