//! JSON-RPC 2.0 dispatcher over HTTP
//!
//! This crate turns plain functions into JSON-RPC methods served from a
//! single HTTP endpoint. Each request body goes through one pipeline:
//!
//! 1. **Decode**: parse the body, tell parse errors from invalid envelopes
//! 2. **Lookup**: find the method in the [`MethodRegistry`]
//! 3. **Policy**: refuse notifications to methods that don't allow them
//! 4. **Auth**: strip and verify `username`/`password` for protected methods
//! 5. **Bind**: map positional or named params onto the [`Signature`]
//! 6. **Invoke**: run the [`Procedure`] through the middleware chain
//!
//! The result is encoded by [`response::encode`]: a JSON-RPC body with a
//! status code and headers, or `204 No Content` for notifications.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jrd_server::{from_typed_fn, JrdServer, MethodOptions, ParamType, Procedure, Signature};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let echo = Procedure::new(
//!         Signature::builder()
//!             .param_with_default("name", ParamType::String, "World".into())
//!             .build()?,
//!         from_typed_fn(|args| async move {
//!             let name: String = args.get("name")?;
//!             Ok(format!("Hello {}", name))
//!         }),
//!     );
//!
//!     let server = JrdServer::builder()
//!         .bind_str("127.0.0.1:5000")?
//!         .method("App.echo", echo, MethodOptions::default())
//!         .build()
//!         .await?;
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! Methods registered with [`MethodOptions::authenticated`] or
//! [`MethodOptions::requires_auth`] take credentials as the first two
//! positional params or as `username`/`password` named params. They are
//! checked and removed before binding, so the procedure never sees them.

mod auth;
mod binder;
mod builder;
mod dispatcher;
mod handler;
pub mod http;
mod metrics;
mod middleware;
mod registry;
pub mod response;
mod signature;

pub use auth::{AuthBackend, AuthCheck, AuthHook, CredentialAuthBackend, Credentials};
pub use binder::{bind, BoundArgs};
pub use builder::ServerBuilder;
pub use dispatcher::{DispatchOutcome, Dispatched, Dispatcher, DispatcherConfig, Stage};
pub use handler::{from_fn, from_typed_fn, AsyncHandler, Handler, HandlerResult, Procedure, Reply};
pub use metrics::DispatchMetrics;
pub use middleware::{
    MetricsMiddleware, Middleware, MiddlewareAction, MiddlewareChain, MiddlewareContext,
    SyncMiddleware, TracingMiddleware,
};
pub use registry::{AuthPolicy, MethodOptions, MethodRegistry, RegisteredMethod};
pub use response::HttpReply;
pub use signature::{ParamKind, ParamSpec, ParamType, Signature, SignatureBuilder};

pub use jrd_core::{Error, Result};
pub use serde_json;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

/// A bound JSON-RPC server
///
/// Created by [`ServerBuilder::build`], which already owns the listening
/// socket; [`run`](Self::run) serves it until the task is dropped.
pub struct JrdServer {
    local_addr: SocketAddr,
    path: String,
    dispatcher: Arc<Dispatcher>,
    server: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl JrdServer {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Address the server is bound to
    ///
    /// With port `0` in the bind address this is the port the OS picked.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full endpoint URL
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Dispatcher behind the endpoint
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve requests
    #[tracing::instrument(skip(self), name = "server.run", fields(addr = %self.local_addr))]
    pub async fn run(self) {
        tracing::info!("Starting JSON-RPC server");
        self.server.await;
    }

    /// Serve requests on a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl std::fmt::Debug for JrdServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JrdServer")
            .field("local_addr", &self.local_addr)
            .field("path", &self.path)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
