//! Procedures, handlers and replies
//!
//! A [`Procedure`] is what gets registered under a method name: a
//! [`Signature`] describing its formal parameters plus a [`Handler`] that
//! runs once the wire params have been bound.
//!
//! Handlers produce a [`Reply`]: the JSON result together with the HTTP
//! status and extra headers the response should carry. Most procedures only
//! care about the value and use [`from_typed_fn`], which wraps any
//! `Serialize` result into a `200` reply.
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{from_fn, from_typed_fn, ParamType, Procedure, Reply, Signature};
//!
//! let signature = Signature::builder()
//!     .param("name", ParamType::String)
//!     .build()
//!     .unwrap();
//!
//! // Plain value
//! let hello = Procedure::new(
//!     signature.clone(),
//!     from_typed_fn(|args| async move {
//!         let name: String = args.get("name")?;
//!         Ok(format!("Hello {}", name))
//!     }),
//! );
//!
//! // Value with status and headers
//! let created = Procedure::new(
//!     signature,
//!     from_fn(|args| async move {
//!         let name: String = args.get("name")?;
//!         Ok(Reply::new(name.into()).with_status(201).with_header("X-Created", "1"))
//!     }),
//! );
//! # let _ = (hello, created);
//! ```

use crate::binder::BoundArgs;
use crate::signature::Signature;
use jrd_core::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result of a procedure: a JSON value plus HTTP status and headers
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The JSON-RPC `result`
    pub value: Value,
    /// HTTP status of the response
    pub status: u16,
    /// Extra HTTP headers
    pub headers: HashMap<String, String>,
}

impl Reply {
    /// A `200` reply without extra headers
    pub fn new(value: Value) -> Self {
        Self {
            value,
            status: 200,
            headers: HashMap::new(),
        }
    }

    /// Serialize any value into a `200` reply
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` when the value cannot be represented
    /// as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// A reply with explicit status and headers
    pub fn with_status_and_headers(
        value: Value,
        status: u16,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            value,
            status,
            headers,
        }
    }

    /// Override the HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add an HTTP header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace all extra headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::new(value)
    }
}

/// Future returned by a handler
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Reply>> + Send>>;

/// The invocable part of a procedure
///
/// Handlers receive arguments already bound to the procedure's signature
/// and must be `Send + Sync`: a registered procedure may be invoked from
/// many requests at once.
pub trait Handler: Send + Sync {
    /// Invoke the procedure with bound arguments
    fn call(&self, args: BoundArgs) -> HandlerResult;
}

/// Adapts an async closure into a [`Handler`]
pub struct AsyncHandler<F, Fut>
where
    F: Fn(BoundArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    func: F,
}

impl<F, Fut> AsyncHandler<F, Fut>
where
    F: Fn(BoundArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    /// Wrap an async function
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for AsyncHandler<F, Fut>
where
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    fn call(&self, args: BoundArgs) -> HandlerResult {
        Box::pin((self.func)(args))
    }
}

/// Create a handler from an async function returning a full [`Reply`]
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    Box::new(AsyncHandler::new(func))
}

/// Create a handler from an async function returning any serializable value
///
/// The value becomes the `result` of a `200` response. Serialization
/// failures surface as internal errors.
pub fn from_typed_fn<R, F, Fut>(func: F) -> Box<dyn Handler>
where
    R: Serialize + Send + 'static,
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let func = Arc::new(func);

    from_fn(move |args: BoundArgs| {
        let func = Arc::clone(&func);
        async move {
            let result = func(args).await?;
            Reply::json(&result)
        }
    })
}

/// A registrable unit: signature plus handler
#[derive(Clone)]
pub struct Procedure {
    signature: Signature,
    handler: Arc<dyn Handler>,
}

impl Procedure {
    /// Pair a signature with its handler
    pub fn new(signature: Signature, handler: Box<dyn Handler>) -> Self {
        Self {
            signature,
            handler: Arc::from(handler),
        }
    }

    /// A procedure without parameters
    pub fn without_params(handler: Box<dyn Handler>) -> Self {
        Self::new(Signature::empty(), handler)
    }

    /// The procedure's formal parameters
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Invoke the handler
    pub fn call(&self, args: BoundArgs) -> HandlerResult {
        self.handler.call(args)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}
