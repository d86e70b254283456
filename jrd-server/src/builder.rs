//! Server builder for constructing JSON-RPC servers
//!
//! The builder provides a fluent API for configuring and creating a
//! [`JrdServer`]. It allows you to:
//! - Set the bind address and endpoint path
//! - Register procedures with their method options
//! - Configure the default auth check
//! - Add middleware
//! - Tune notification error echoing
//! - Enable observability and dispatch metrics
//!
//! Methods are registered when the server is built, after every other
//! setting is known, so `auth_check` may come before or after the methods
//! that use it. Registration errors (duplicate names, `requires_auth()`
//! without an auth check) are reported by [`build`](ServerBuilder::build),
//! first one wins.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrd_server::{from_typed_fn, JrdServer, MethodOptions, Procedure};
//!
//! # async fn example() -> jrd_core::Result<()> {
//! let server = JrdServer::builder()
//!     .bind_str("127.0.0.1:5000")?
//!     .path("/api")
//!     .auth_check(|user: &str, pass: &str| user == "username" && pass == "secret")
//!     .method(
//!         "ping",
//!         Procedure::without_params(from_typed_fn(|_| async { Ok("pong") })),
//!         MethodOptions::default(),
//!     )
//!     .with_default_observability()
//!     .build()
//!     .await?;
//!
//! server.run().await;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthBackend, AuthCheck};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::handler::Procedure;
use crate::http;
use crate::metrics::DispatchMetrics;
use crate::middleware::{Middleware, MiddlewareChain, SyncMiddleware};
use crate::registry::{MethodOptions, MethodRegistry};
use crate::JrdServer;
use jrd_core::{Error, ObservabilityConfig, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// Builder for constructing a JSON-RPC server
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    path: String,
    registry: MethodRegistry,
    methods: Vec<(String, Procedure, MethodOptions)>,
    middleware_chain: MiddlewareChain,
    config: DispatcherConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    enable_metrics: bool,
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            addr: None,
            path: http::DEFAULT_PATH.to_string(),
            registry: MethodRegistry::new(),
            methods: Vec::new(),
            middleware_chain: MiddlewareChain::new(),
            config: DispatcherConfig::default(),
            observability_config: None,
            service_name: None,
            enable_metrics: false,
        }
    }

    /// Set the bind address for the server
    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Set the bind address from a string (e.g., "127.0.0.1:5000")
    pub fn bind_str(mut self, addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid address '{}': {}", addr, e)))?;
        self.addr = Some(addr);
        Ok(self)
    }

    /// Set the endpoint path (default `/api`)
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the default auth check for methods registered with `requires_auth()`
    pub fn auth_check(mut self, check: impl AuthCheck + 'static) -> Self {
        self.registry = self.registry.with_auth_check(check);
        self
    }

    /// Replace the credential extraction policy
    pub fn auth_backend(mut self, backend: impl AuthBackend + 'static) -> Self {
        self.registry = self.registry.with_auth_backend(backend);
        self
    }

    /// Register a procedure when the server is built
    pub fn method(
        mut self,
        name: impl Into<String>,
        procedure: Procedure,
        options: MethodOptions,
    ) -> Self {
        self.methods.push((name.into(), procedure, options));
        self
    }

    /// Use a prepared registry, including its auth check and backend
    ///
    /// Methods added with [`method`](Self::method) are registered into it
    /// at build time.
    pub fn registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add middleware to the server
    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware_chain.add(middleware);
        self
    }

    /// Add sync middleware to the server
    pub fn use_sync_middleware<T: SyncMiddleware + 'static>(mut self, middleware: T) -> Self {
        self.middleware_chain.add_sync(middleware);
        self
    }

    /// Replace the dispatcher configuration
    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Answer notifications that fail before invocation (default true)
    pub fn echo_notification_errors(mut self, echo: bool) -> Self {
        self.config.echo_notification_errors = echo;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability and metrics
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Record dispatch metrics even without `with_observability`
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Build the dispatcher without binding a socket
    ///
    /// Useful to mount the endpoint into an existing `warp` application
    /// via [`http::routes`].
    pub fn build_dispatcher(self) -> Result<Dispatcher> {
        let registry = register_all(self.registry, self.methods)?;
        let metrics = self.enable_metrics.then(|| {
            let name = self.service_name.clone().unwrap_or_else(|| "jrd".to_string());
            Arc::new(DispatchMetrics::new(name))
        });
        Ok(assemble(
            registry,
            self.middleware_chain,
            self.config,
            metrics,
        ))
    }

    /// Build and bind the server
    ///
    /// # Errors
    ///
    /// - the first registration error among the [`method`](Self::method) calls
    /// - `Error::Configuration` when no bind address was set
    /// - `Error::Internal` when observability cannot be initialized
    /// - `Error::Io` when the address cannot be bound
    pub async fn build(self) -> Result<JrdServer> {
        let registry = register_all(self.registry, self.methods)?;
        let addr = self
            .addr
            .ok_or_else(|| Error::Configuration("No bind address specified".to_string()))?;

        let mut metrics_name = None;
        if let Some(mut config) = self.observability_config {
            if let Some(name) = &self.service_name {
                config.service_name = name.clone();
            }
            jrd_core::init_observability(config.clone()).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;
            metrics_name = Some(config.service_name);
        } else if self.enable_metrics {
            metrics_name = Some(self.service_name.unwrap_or_else(|| "jrd".to_string()));
        }
        let metrics = metrics_name.map(|name| Arc::new(DispatchMetrics::new(name)));

        let dispatcher = Arc::new(assemble(
            registry,
            self.middleware_chain,
            self.config,
            metrics,
        ));

        let routes = http::routes(Arc::clone(&dispatcher), self.path.clone());
        let (local_addr, server) = warp::serve(routes)
            .try_bind_ephemeral(addr)
            .map_err(|e| Error::Io(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(
            addr = %local_addr,
            path = %self.path,
            methods = dispatcher.registry().len(),
            "Server listening"
        );

        Ok(JrdServer {
            local_addr,
            path: self.path,
            dispatcher,
            server: Box::pin(server),
        })
    }
}

fn register_all(
    mut registry: MethodRegistry,
    methods: Vec<(String, Procedure, MethodOptions)>,
) -> Result<MethodRegistry> {
    for (name, procedure, options) in methods {
        registry.register(name, procedure, options)?;
    }
    Ok(registry)
}

fn assemble(
    registry: MethodRegistry,
    middleware: MiddlewareChain,
    config: DispatcherConfig,
    metrics: Option<Arc<DispatchMetrics>>,
) -> Dispatcher {
    let dispatcher = Dispatcher::new(registry)
        .with_middleware(middleware)
        .with_config(config);
    match metrics {
        Some(metrics) => dispatcher.with_metrics(metrics),
        None => dispatcher,
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_typed_fn;

    fn ping() -> Procedure {
        Procedure::without_params(from_typed_fn(|_| async { Ok("pong") }))
    }

    #[tokio::test]
    async fn test_builder_basic() {
        let server = ServerBuilder::new()
            .bind_str("127.0.0.1:0")
            .unwrap()
            .method("ping", ping(), MethodOptions::default())
            .build()
            .await
            .unwrap();

        assert!(server.dispatcher().registry().contains("ping"));
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.path(), "/api");
    }

    #[tokio::test]
    async fn test_builder_no_address() {
        let result = ServerBuilder::new().build().await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_builder_reports_first_registration_error() {
        let result = ServerBuilder::new()
            .bind_str("127.0.0.1:0")
            .unwrap()
            .method("ping", ping(), MethodOptions::default())
            .method("ping", ping(), MethodOptions::default())
            .method("secure", ping(), MethodOptions::new().requires_auth())
            .build()
            .await;
        assert!(matches!(result, Err(Error::DuplicateMethod(_))));
    }

    #[test]
    fn test_requires_auth_with_builder_check() {
        let dispatcher = ServerBuilder::new()
            .auth_check(|u: &str, p: &str| u == "username" && p == "secret")
            .method("secure", ping(), MethodOptions::new().requires_auth())
            .build_dispatcher()
            .unwrap();
        assert!(dispatcher.registry().lookup("secure").unwrap().requires_auth());
    }

    #[test]
    fn test_auth_check_may_follow_methods() {
        let dispatcher = ServerBuilder::new()
            .method("secure", ping(), MethodOptions::new().requires_auth())
            .auth_check(|u: &str, p: &str| u == "username" && p == "secret")
            .build_dispatcher()
            .unwrap();
        assert!(dispatcher.registry().lookup("secure").unwrap().requires_auth());

        let missing = ServerBuilder::new()
            .method("secure", ping(), MethodOptions::new().requires_auth())
            .build_dispatcher();
        assert!(matches!(missing, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_dispatcher_config() {
        let dispatcher = ServerBuilder::new()
            .echo_notification_errors(false)
            .with_metrics()
            .service_name("builder-test")
            .build_dispatcher()
            .unwrap();
        assert!(!dispatcher.config().echo_notification_errors);
    }

    #[test]
    fn test_builder_bind_str() {
        assert!(ServerBuilder::new().bind_str("127.0.0.1:5000").is_ok());
        assert!(matches!(
            ServerBuilder::new().bind_str("invalid:address"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_default() {
        let builder = ServerBuilder::default();
        assert!(builder.addr.is_none());
        assert_eq!(builder.path, "/api");
        assert!(builder.config.echo_notification_errors);
    }
}
