//! Request dispatcher
//!
//! The dispatcher drives one decoded request through the pipeline:
//!
//! ```text
//! lookup → notification policy → params shape → auth hook → binder → middleware → procedure
//! ```
//!
//! Each step either passes its output on or stops the request with a typed
//! [`Error`]. The result is a [`Dispatched`] value recording the request id,
//! whether it was a notification, and a [`DispatchOutcome`] that says which
//! [`Stage`] failed, if any. The response encoder turns that into HTTP.
//!
//! # Notifications
//!
//! A request without an `id` runs the full pipeline but never gets a
//! success body. Failures before the procedure runs are echoed with
//! `"id": null` when [`DispatcherConfig::echo_notification_errors`] is on;
//! failures of the procedure itself are always dropped and only logged.
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{from_typed_fn, Dispatcher, MethodOptions, MethodRegistry, Procedure};
//! use jrd_core::{Id, JsonRpcRequest};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut registry = MethodRegistry::new();
//! registry
//!     .register(
//!         "ping",
//!         Procedure::without_params(from_typed_fn(|_| async { Ok("pong") })),
//!         MethodOptions::default(),
//!     )
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(registry);
//! let dispatched = dispatcher
//!     .dispatch(JsonRpcRequest::new("ping", None, Id::from(1i64)))
//!     .await;
//! assert!(dispatched.is_success());
//! # }
//! ```

use crate::binder::{bind, BoundArgs};
use crate::handler::Reply;
use crate::metrics::DispatchMetrics;
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use crate::registry::{MethodRegistry, RegisteredMethod};
use crate::response::{self, HttpReply};
use futures::FutureExt;
use jrd_core::codec::{self, Rejected};
use jrd_core::{Error, Id, JsonRpcRequest, Params, Result};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Dispatcher behaviour switches
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Answer notifications that fail before invocation with an `id: null` error
    pub echo_notification_errors: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            echo_notification_errors: true,
        }
    }
}

/// Pipeline step at which a request stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The body was not a valid request
    Decode,
    /// The method name is not registered
    Lookup,
    /// A notification reached a method that forbids them
    Policy,
    /// The auth hook rejected the call
    Auth,
    /// Params could not be bound or failed validation
    Bind,
    /// The procedure (or middleware around it) failed
    Invoke,
}

impl Stage {
    /// True for every step before the procedure runs
    pub fn is_pre_invocation(self) -> bool {
        self != Stage::Invoke
    }

    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Lookup => "lookup",
            Stage::Policy => "policy",
            Stage::Auth => "auth",
            Stage::Bind => "bind",
            Stage::Invoke => "invoke",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a request ended
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The procedure produced a reply
    Success(Reply),
    /// The request stopped with an error
    Failure {
        /// What went wrong
        error: Error,
        /// Where it went wrong
        stage: Stage,
    },
}

impl DispatchOutcome {
    fn failed(error: Error, stage: Stage) -> Self {
        DispatchOutcome::Failure { error, stage }
    }
}

/// A dispatched request, ready for the response encoder
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The request id, if any
    pub id: Option<Id>,
    /// True when the request carried no id
    pub notification: bool,
    /// How the request ended
    pub outcome: DispatchOutcome,
}

impl Dispatched {
    /// A body that never became a request
    ///
    /// Such failures are always answered: without a readable envelope the
    /// request cannot be known to be a notification.
    pub fn rejected(rejected: Rejected) -> Self {
        Self {
            id: rejected.id,
            notification: false,
            outcome: DispatchOutcome::failed(rejected.error, Stage::Decode),
        }
    }

    /// True when the procedure produced a reply
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Success(_))
    }

    /// The error, if the request failed
    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// Runs requests against a [`MethodRegistry`]
///
/// Holds no per-request state; share it behind an `Arc` and call it from
/// as many tasks as needed.
pub struct Dispatcher {
    registry: MethodRegistry,
    middleware: MiddlewareChain,
    config: DispatcherConfig,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry,
            middleware: MiddlewareChain::new(),
            config: DispatcherConfig::default(),
            metrics: None,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Run this middleware chain around every invocation
    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// Record dispatch metrics
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The registry requests are resolved against
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// The active configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Decode a raw body, dispatch it and encode the HTTP reply
    pub async fn handle_body(&self, body: &[u8]) -> HttpReply {
        let dispatched = match codec::decode_request(body) {
            Ok(request) => self.dispatch(request).await,
            Err(rejected) => {
                tracing::warn!(error = %rejected.error, id = ?rejected.id, "Rejected request body");
                if let Some(metrics) = &self.metrics {
                    metrics.record_error("", error_kind(&rejected.error));
                }
                Dispatched::rejected(rejected)
            }
        };
        response::encode(dispatched, &self.config)
    }

    /// Run one request through the pipeline
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Dispatched {
        let started = Instant::now();
        let id = request.id.clone();
        let notification = request.is_notification();
        let method = request.method.clone();

        let span = tracing::info_span!("jsonrpc_dispatch", method = %method, id = ?id);
        let outcome = async {
            let outcome = self.run(request).await;
            log_outcome(&outcome, notification);
            outcome
        }
        .instrument(span)
        .await;

        self.record(&method, notification, &outcome, started.elapsed());

        Dispatched {
            id,
            notification,
            outcome,
        }
    }

    async fn run(&self, request: JsonRpcRequest) -> DispatchOutcome {
        let JsonRpcRequest {
            method: name,
            params,
            id,
            ..
        } = request;

        let method = match self.registry.lookup(&name) {
            Ok(method) => method,
            Err(e) => return DispatchOutcome::failed(e, Stage::Lookup),
        };

        if id.is_none() && !method.notification() {
            return DispatchOutcome::failed(
                Error::InvalidRequest(format!(
                    "Method '{}' doesn't allow notifications",
                    name
                )),
                Stage::Policy,
            );
        }

        let params = match Params::from_value(params) {
            Ok(params) => params,
            Err(e) => return DispatchOutcome::failed(e, Stage::Bind),
        };

        let params = match method.auth_hook() {
            Some(hook) => match hook.apply(params).await {
                Ok(rest) => rest,
                Err(e) => return DispatchOutcome::failed(e, Stage::Auth),
            },
            None => params,
        };

        // Middleware sees the params as bound, without credentials
        let ctx_params = (!self.middleware.is_empty()).then(|| params.clone());

        let args = match bind(method.signature(), params, method.validate()) {
            Ok(args) => args,
            Err(e) => return DispatchOutcome::failed(e, Stage::Bind),
        };

        let result = match ctx_params {
            None => invoke(method, args).await,
            Some(params) => {
                let ctx = MiddlewareContext::new(name, params, id);
                self.middleware
                    .execute(ctx, move |_ctx| invoke(method, args))
                    .await
            }
        };

        match result {
            Ok(reply) => DispatchOutcome::Success(reply),
            Err(e) => DispatchOutcome::failed(e, Stage::Invoke),
        }
    }

    fn record(&self, method: &str, notification: bool, outcome: &DispatchOutcome, elapsed: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if notification {
            metrics.record_notification(method);
        }
        match outcome {
            DispatchOutcome::Success(_) => {
                metrics.record_request(method, "success", elapsed.as_secs_f64())
            }
            DispatchOutcome::Failure { error, .. } => {
                metrics.record_request(method, "error", elapsed.as_secs_f64());
                metrics.record_error(method, error_kind(error));
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("middleware", &self.middleware.len())
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Run a procedure, turning a panic into an internal error
///
/// The handler is called inside the guarded future, so a panic before it
/// returns its future is caught too.
async fn invoke(method: Arc<RegisteredMethod>, args: BoundArgs) -> Result<Reply> {
    let call = async move { method.procedure().call(args).await };
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(Error::Internal("procedure panicked".to_string())),
    }
}

fn log_outcome(outcome: &DispatchOutcome, notification: bool) {
    match outcome {
        DispatchOutcome::Success(reply) => {
            tracing::debug!(status = reply.status, notification, "Request dispatched")
        }
        DispatchOutcome::Failure { error, stage } if error.is_client_error() => {
            tracing::warn!(stage = %stage, error = %error, notification, "Request rejected")
        }
        DispatchOutcome::Failure { error, stage } => {
            tracing::error!(stage = %stage, error = %error, notification, "Request failed")
        }
    }
}

fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::JsonRpc(_) => "jsonrpc",
        Error::Parse(_) => "parse_error",
        Error::InvalidRequest(_) => "invalid_request",
        Error::MethodNotFound(_) => "method_not_found",
        Error::InvalidParams(_) | Error::ParamType { .. } => "invalid_params",
        Error::InvalidCredentials => "invalid_credentials",
        Error::Application { .. } => "application",
        Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "internal",
        Error::DuplicateMethod(_) | Error::Signature(_) | Error::Configuration(_) => {
            "configuration"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{from_fn, from_typed_fn, Handler, HandlerResult, Procedure};
    use crate::registry::MethodOptions;
    use crate::signature::{ParamType, Signature};
    use serde_json::{json, Value};

    fn registry() -> MethodRegistry {
        let mut registry =
            MethodRegistry::new().with_auth_check(|u: &str, p: &str| u == "username" && p == "secret");

        let echo = Procedure::new(
            Signature::builder()
                .param_with_default("name", ParamType::String, json!(""))
                .build()
                .unwrap(),
            from_typed_fn(|args| async move {
                let name: String = args.get("name")?;
                Ok(format!("Hello {}", name))
            }),
        );
        registry
            .register("App.echo", echo.clone(), MethodOptions::default())
            .unwrap();
        registry
            .register("App.secure", echo.clone(), MethodOptions::new().requires_auth())
            .unwrap();
        registry
            .register("App.strict", echo, MethodOptions::new().notification(false))
            .unwrap();

        let fails = Procedure::new(
            Signature::builder()
                .param("n", ParamType::Integer)
                .build()
                .unwrap(),
            from_typed_fn(|args| async move {
                let n: i64 = args.get("n")?;
                if n % 2 == 1 {
                    return Err(Error::application("number is odd"));
                }
                Ok(n)
            }),
        );
        registry
            .register("jsonrpc.fails", fails, MethodOptions::default())
            .unwrap();

        let panics = Procedure::without_params(from_fn(|_| async {
            if true {
                panic!("boom");
            }
            Ok(Reply::new(Value::Null))
        }));
        registry
            .register("App.panics", panics, MethodOptions::default())
            .unwrap();

        struct PanicsOnCall;

        impl Handler for PanicsOnCall {
            fn call(&self, _args: BoundArgs) -> HandlerResult {
                panic!("boom before the future exists");
            }
        }

        registry
            .register(
                "App.panics_on_call",
                Procedure::without_params(Box::new(PanicsOnCall)),
                MethodOptions::default(),
            )
            .unwrap();

        registry
    }

    fn call(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(method, Some(params), Id::from(1i64))
    }

    fn stage(dispatched: &Dispatched) -> Option<Stage> {
        match dispatched.outcome {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::Failure { stage, .. } => Some(stage),
        }
    }

    #[tokio::test]
    async fn test_successful_call() {
        let dispatcher = Dispatcher::new(registry());
        let dispatched = dispatcher.dispatch(call("App.echo", json!(["World"]))).await;

        assert_eq!(dispatched.id, Some(Id::from(1i64)));
        match dispatched.outcome {
            DispatchOutcome::Success(reply) => assert_eq!(reply.value, json!("Hello World")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let dispatcher = Dispatcher::new(registry());
        let dispatched = dispatcher.dispatch(call("App.nope", json!([]))).await;
        assert!(matches!(dispatched.error(), Some(Error::MethodNotFound(_))));
        assert_eq!(stage(&dispatched), Some(Stage::Lookup));
    }

    #[tokio::test]
    async fn test_notification_policy() {
        let dispatcher = Dispatcher::new(registry());

        let dispatched = dispatcher
            .dispatch(JsonRpcRequest::notification("App.strict", Some(json!([]))))
            .await;
        assert!(dispatched.notification);
        assert_eq!(stage(&dispatched), Some(Stage::Policy));

        // With an id the flag does not matter
        let dispatched = dispatcher.dispatch(call("App.strict", json!([]))).await;
        assert!(dispatched.is_success());
    }

    #[tokio::test]
    async fn test_auth_stages() {
        let dispatcher = Dispatcher::new(registry());

        let ok = dispatcher
            .dispatch(call("App.secure", json!(["username", "secret", "Flask"])))
            .await;
        match ok.outcome {
            DispatchOutcome::Success(reply) => assert_eq!(reply.value, json!("Hello Flask")),
            other => panic!("unexpected {other:?}"),
        }

        let denied = dispatcher
            .dispatch(call("App.secure", json!(["username", "wrong"])))
            .await;
        assert!(matches!(denied.error(), Some(Error::InvalidCredentials)));
        assert_eq!(stage(&denied), Some(Stage::Auth));

        let short = dispatcher.dispatch(call("App.secure", json!(["username"]))).await;
        assert!(matches!(short.error(), Some(Error::InvalidParams(_))));
        assert_eq!(stage(&short), Some(Stage::Auth));
    }

    #[tokio::test]
    async fn test_bind_stage() {
        let dispatcher = Dispatcher::new(registry());

        let dispatched = dispatcher.dispatch(call("App.echo", json!([1]))).await;
        assert!(matches!(dispatched.error(), Some(Error::ParamType { .. })));
        assert_eq!(stage(&dispatched), Some(Stage::Bind));

        let scalar = JsonRpcRequest::new("App.echo", Some(json!("x")), Id::from(2i64));
        let dispatched = dispatcher.dispatch(scalar).await;
        assert!(matches!(dispatched.error(), Some(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_application_error() {
        let dispatcher = Dispatcher::new(registry());
        let dispatched = dispatcher.dispatch(call("jsonrpc.fails", json!([3]))).await;

        assert_eq!(stage(&dispatched), Some(Stage::Invoke));
        let data = dispatched.error().unwrap().to_error_data();
        assert!((-32099..=-32000).contains(&data.code));

        let dispatched = dispatcher.dispatch(call("jsonrpc.fails", json!([2]))).await;
        assert!(dispatched.is_success());
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let dispatcher = Dispatcher::new(registry());
        let dispatched = dispatcher.dispatch(call("App.panics", json!([]))).await;
        assert!(matches!(dispatched.error(), Some(Error::Internal(_))));
        assert_eq!(stage(&dispatched), Some(Stage::Invoke));
    }

    #[tokio::test]
    async fn test_panic_while_calling_handler_is_caught() {
        let dispatcher = Dispatcher::new(registry());
        let dispatched = dispatcher
            .dispatch(call("App.panics_on_call", json!([])))
            .await;
        assert!(matches!(dispatched.error(), Some(Error::Internal(_))));
        assert_eq!(stage(&dispatched), Some(Stage::Invoke));

        let mut chain = MiddlewareChain::new();
        chain.add(Arc::new(crate::middleware::TracingMiddleware::new()));
        let dispatcher = Dispatcher::new(registry()).with_middleware(chain);
        let dispatched = dispatcher
            .dispatch(call("App.panics_on_call", json!([])))
            .await;
        assert!(matches!(dispatched.error(), Some(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_middleware_sees_params_without_credentials() {
        use crate::middleware::{MiddlewareAction, SyncMiddleware};
        use std::sync::Mutex;

        struct Capture(Arc<Mutex<Vec<Params>>>);

        impl SyncMiddleware for Capture {
            fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
                self.0.lock().unwrap().push(ctx.params.clone());
                Ok(MiddlewareAction::Continue)
            }

            fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Reply>) -> Result<()> {
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.add_sync(Capture(Arc::clone(&seen)));

        let dispatcher = Dispatcher::new(registry()).with_middleware(chain);
        let dispatched = dispatcher
            .dispatch(call("App.secure", json!(["username", "secret", "World"])))
            .await;
        assert!(dispatched.is_success());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Params::Positional(vec![json!("World")])]);
    }

    #[tokio::test]
    async fn test_handle_body_rejections() {
        let dispatcher = Dispatcher::new(registry());

        let reply = dispatcher.handle_body(b"{oops").await;
        assert_eq!(reply.status, 400);
        let body: Value = serde_json::from_str(reply.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);

        let reply = dispatcher
            .handle_body(br#"[{"jsonrpc":"2.0","method":"App.echo","id":1}]"#)
            .await;
        let body: Value = serde_json::from_str(reply.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_metrics_recording() {
        let metrics = Arc::new(DispatchMetrics::new("dispatcher-test"));
        let dispatcher = Dispatcher::new(registry()).with_metrics(metrics);

        assert!(dispatcher.dispatch(call("App.echo", json!([]))).await.is_success());
        assert!(!dispatcher.dispatch(call("missing", json!([]))).await.is_success());
        dispatcher.handle_body(b"nope").await;
    }

    #[test]
    fn test_stage_labels() {
        assert!(Stage::Bind.is_pre_invocation());
        assert!(!Stage::Invoke.is_pre_invocation());
        assert_eq!(Stage::Auth.to_string(), "auth");
        assert_eq!(error_kind(&Error::InvalidCredentials), "invalid_credentials");
    }
}
