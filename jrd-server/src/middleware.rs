//! Middleware around procedure invocation
//!
//! Middleware intercepts calls to registered methods once the auth hook
//! and the binder have accepted them. Typical uses are logging, tracing,
//! metrics and caching.
//!
//! # Middleware Chain
//!
//! Middleware runs in registration order. Each one can:
//! - Inspect the call (method, params without credentials, request id)
//! - Short-circuit with a [`Reply`], skipping the procedure
//! - Observe the outcome after the procedure ran
//! - Pass metadata to later middleware
//!
//! A `pre_handle` error aborts the call and is reported like a failure of
//! the procedure itself.
//!
//! # Built-in Middleware
//!
//! - **TracingMiddleware**: structured `tracing` events per call
//! - **MetricsMiddleware**: in-process call counter
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{MiddlewareChain, TracingMiddleware};
//! use std::sync::Arc;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.add(Arc::new(TracingMiddleware::new()));
//! assert_eq!(chain.len(), 1);
//! ```

use crate::handler::Reply;
use async_trait::async_trait;
use jrd_core::{Id, Params, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Action to take after middleware pre-processing
#[derive(Debug, Clone)]
pub enum MiddlewareAction {
    /// Continue to next middleware/procedure
    Continue,
    /// Skip the procedure and answer with this reply
    ShortCircuit(Reply),
}

/// What middleware sees of a call
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    /// The method being called
    pub method: String,
    /// Params after the auth hook stripped credentials
    pub params: Params,
    /// Request id; `None` for notifications
    pub request_id: Option<Id>,
    /// Metadata for passing data between middleware
    pub metadata: HashMap<String, Value>,
}

impl MiddlewareContext {
    /// Create a context for a call
    pub fn new(method: impl Into<String>, params: Params, request_id: Option<Id>) -> Self {
        Self {
            method: method.into(),
            params,
            request_id,
            metadata: HashMap::new(),
        }
    }

    /// True when the call is a notification
    pub fn is_notification(&self) -> bool {
        self.request_id.is_none()
    }

    /// Insert metadata that can be accessed by subsequent middleware
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Get metadata by key
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Trait for async middleware
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Called before the procedure runs
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    /// Called after the procedure ran
    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Reply>) -> Result<()>;
}

/// Trait for synchronous middleware (no async operations)
pub trait SyncMiddleware: Send + Sync {
    /// Called before the procedure runs
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    /// Called after the procedure ran
    fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Reply>) -> Result<()>;
}

struct SyncMiddlewareAdapter<T: SyncMiddleware> {
    inner: T,
}

#[async_trait]
impl<T: SyncMiddleware + 'static> Middleware for SyncMiddlewareAdapter<T> {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.inner.pre_handle(ctx)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Reply>) -> Result<()> {
        self.inner.post_handle(ctx, result)
    }
}

/// Chain of middleware to execute in order
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Add a sync middleware to the chain
    pub fn add_sync<T: SyncMiddleware + 'static>(&mut self, middleware: T) {
        self.middlewares
            .push(Arc::new(SyncMiddlewareAdapter { inner: middleware }));
    }

    /// Run the chain around `handler`
    pub async fn execute<F, Fut>(&self, mut ctx: MiddlewareContext, handler: F) -> Result<Reply>
    where
        F: FnOnce(MiddlewareContext) -> Fut + Send,
        Fut: std::future::Future<Output = Result<Reply>> + Send,
    {
        for middleware in &self.middlewares {
            match middleware.pre_handle(&mut ctx).await? {
                MiddlewareAction::Continue => continue,
                MiddlewareAction::ShortCircuit(reply) => return Ok(reply),
            }
        }

        let result = handler(ctx.clone()).await;

        // post_handle errors are logged so every middleware gets to run
        for middleware in self.middlewares.iter().rev() {
            if let Err(e) = middleware.post_handle(&mut ctx, &result).await {
                tracing::warn!(method = %ctx.method, error = %e, "post_handle failed");
            }
        }

        result
    }

    /// Get the number of middleware in the chain
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Emits a structured event when a call starts and when it finishes
///
/// The dispatcher already wraps each request in a `jsonrpc_dispatch` span,
/// so these events inherit `method` and `id` from it.
#[derive(Debug, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    /// Create a new tracing middleware
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        tracing::debug!(
            method = %ctx.method,
            params = ctx.params.len(),
            notification = ctx.is_notification(),
            "Call started"
        );
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Reply>) -> Result<()> {
        match result {
            Ok(reply) => tracing::info!(method = %ctx.method, status = reply.status, "Call completed"),
            Err(e) => tracing::warn!(method = %ctx.method, error = %e, "Call failed"),
        }
        Ok(())
    }
}

/// Counts calls and measures their latency
///
/// Latency is taken from a monotonic clock owned by the middleware; the
/// context only carries the offset at which the call started.
#[derive(Debug)]
pub struct MetricsMiddleware {
    epoch: Instant,
    request_count: AtomicU64,
    failure_count: AtomicU64,
    total_latency_us: AtomicU64,
}

const STARTED_AT: &str = "metrics.started_at_us";

impl MetricsMiddleware {
    /// Create a middleware with zeroed counters
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            request_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    /// Calls seen so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Calls whose procedure failed
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Summed latency of completed calls
    pub fn total_latency(&self) -> Duration {
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed))
    }

    fn offset_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        ctx.insert_metadata(STARTED_AT, Value::from(self.offset_us()));
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Reply>) -> Result<()> {
        if result.is_err() {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(started) = ctx.get_metadata(STARTED_AT).and_then(Value::as_u64) {
            let elapsed_us = self.offset_us().saturating_sub(started);
            self.total_latency_us.fetch_add(elapsed_us, Ordering::Relaxed);
            tracing::debug!(method = %ctx.method, elapsed_us, "Call latency");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrd_core::Error;
    use serde_json::json;

    struct TestMiddleware {
        name: String,
    }

    impl TestMiddleware {
        fn new(name: impl Into<String>) -> Self {
            Self { name: name.into() }
        }
    }

    impl SyncMiddleware for TestMiddleware {
        fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            ctx.insert_metadata(format!("{}_pre", self.name), Value::Bool(true));
            Ok(MiddlewareAction::Continue)
        }

        fn post_handle(&self, ctx: &mut MiddlewareContext, _result: &Result<Reply>) -> Result<()> {
            ctx.insert_metadata(format!("{}_post", self.name), Value::Bool(true));
            Ok(())
        }
    }

    struct ShortCircuitMiddleware;

    impl SyncMiddleware for ShortCircuitMiddleware {
        fn pre_handle(&self, _ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            Ok(MiddlewareAction::ShortCircuit(
                Reply::new(json!("cached")).with_header("X-Cache", "hit"),
            ))
        }

        fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Reply>) -> Result<()> {
            Ok(())
        }
    }

    struct RejectMiddleware;

    impl SyncMiddleware for RejectMiddleware {
        fn pre_handle(&self, _ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            Err(Error::application("rate limited"))
        }

        fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Reply>) -> Result<()> {
            Ok(())
        }
    }

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::new("App.echo", Params::Absent, Some(Id::from(1i64)))
    }

    #[tokio::test]
    async fn test_middleware_execution_order() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(TestMiddleware::new("first"));
        chain.add_sync(TestMiddleware::new("second"));

        let result = chain
            .execute(ctx(), |ctx| async move {
                assert!(ctx.get_metadata("first_pre").is_some());
                assert!(ctx.get_metadata("second_pre").is_some());
                Ok(Reply::new(json!("handler result")))
            })
            .await;

        assert_eq!(result.unwrap().value, json!("handler result"));
    }

    #[tokio::test]
    async fn test_middleware_short_circuit() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(TestMiddleware::new("first"));
        chain.add_sync(ShortCircuitMiddleware);
        chain.add_sync(TestMiddleware::new("third"));

        let reply = chain
            .execute(ctx(), |_ctx| async move {
                panic!("procedure should not be called");
            })
            .await
            .unwrap();

        assert_eq!(reply.value, json!("cached"));
        assert_eq!(reply.headers.get("X-Cache").map(String::as_str), Some("hit"));
    }

    #[tokio::test]
    async fn test_pre_handle_error_aborts() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(RejectMiddleware);

        let err = chain
            .execute(ctx(), |_ctx| async move {
                panic!("procedure should not be called");
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Application { .. }));
    }

    #[tokio::test]
    async fn test_procedure_error_propagates() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(TestMiddleware::new("test"));

        let result = chain
            .execute(ctx(), |_ctx| async move {
                Err(Error::Internal("test error".to_string()))
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_metrics_middleware() {
        let metrics = Arc::new(MetricsMiddleware::new());
        let mut chain = MiddlewareChain::new();
        chain.add(metrics.clone());

        chain
            .execute(ctx(), |_ctx| async move { Ok(Reply::new(Value::Null)) })
            .await
            .unwrap();
        let _ = chain
            .execute(ctx(), |_ctx| async move {
                Err(Error::application("number is odd"))
            })
            .await;

        assert_eq!(metrics.request_count(), 2);
        assert_eq!(metrics.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_metrics_middleware_measures_latency() {
        let metrics = Arc::new(MetricsMiddleware::new());
        let mut chain = MiddlewareChain::new();
        chain.add(metrics.clone());

        chain
            .execute(ctx(), |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Reply::new(Value::Null))
            })
            .await
            .unwrap();

        assert!(metrics.total_latency() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_tracing_middleware() {
        let middleware = TracingMiddleware::new();
        let mut ctx = ctx();

        let action = middleware.pre_handle(&mut ctx).await.unwrap();
        assert!(matches!(action, MiddlewareAction::Continue));

        let result = Ok(Reply::new(json!("success")));
        middleware.post_handle(&mut ctx, &result).await.unwrap();
    }
}
