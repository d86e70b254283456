//! Logging and OpenTelemetry initialization
//!
//! The dispatcher itself only emits `tracing` spans and events; this module
//! is the bootstrap-side glue that decides where they go. It sets up:
//!
//! - **Logs**: a JSON `tracing-subscriber` fmt layer filtered by `RUST_LOG`
//! - **Traces**: an OTLP/gRPC span exporter bridged via `tracing-opentelemetry`
//! - **Metrics**: an OTLP/gRPC meter provider used by `DispatchMetrics`
//!
//! # Usage Pattern
//!
//! Initialize once at application startup, before building the server:
//!
//! ```rust,no_run
//! use jrd_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("my-service")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     jrd_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... run your application ...
//!
//!     jrd_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! Defaults are read from the environment by the bootstrap layer only:
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector endpoint
//! - `RUST_LOG`: Log level filter (e.g., "info", "jrd_server=debug")

use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Handles kept so shutdown can flush what the global providers buffered
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();
static SHUT_DOWN: AtomicBool = AtomicBool::new(false);

/// Observability configuration
///
/// Traces, metrics and logs can be enabled independently.
///
/// # Defaults
///
/// - Service name: "jrd"
/// - Service version: Current crate version
/// - OTLP endpoint: `$OTEL_EXPORTER_OTLP_ENDPOINT` or "http://localhost:4317"
/// - Traces and metrics disabled, logs enabled
/// - Log level: `$RUST_LOG` or "info"
///
/// # Examples
///
/// ```rust
/// use jrd_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("rpc-api")
///     .with_endpoint("http://collector:4317")
///     .with_traces(true)
///     .with_log_level("debug");
/// assert!(config.enable_traces);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,
    /// Service version attached to every span and metric
    pub service_version: String,
    /// gRPC endpoint of the OpenTelemetry collector
    pub otlp_endpoint: String,
    /// Export spans over OTLP
    pub enable_traces: bool,
    /// Export metrics over OTLP
    pub enable_metrics: bool,
    /// Emit JSON logs to stdout
    pub enable_logs: bool,
    /// Fallback filter directive when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "jrd".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: false,
            enable_metrics: false,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a new configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the log level filter ("error", "warn", "info", "debug", "trace")
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable distributed tracing
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metrics export
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Enable or disable JSON logs on stdout
    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Initialize logging, and OpenTelemetry when enabled
///
/// Call this **once** at startup. A second call returns an error because
/// the global subscriber is already installed.
///
/// # Errors
///
/// Fails when an OTLP exporter cannot be built, when the log filter
/// directive is invalid, or when a global subscriber is already set.
pub fn init_observability(
    config: ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The tracer must exist before the subscriber, which bridges to it
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

/// Build the OTLP tracer provider, register it globally and return a tracer
fn init_tracer(
    config: &ObservabilityConfig,
) -> Result<opentelemetry_sdk::trace::Tracer, Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    if TRACER_PROVIDER.set(provider.clone()).is_err() {
        return Err("tracer provider already initialized".into());
    }
    global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Build the OTLP meter provider (30s export interval) and register it globally
fn init_metrics(
    config: &ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(30))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    if METER_PROVIDER.set(provider.clone()).is_err() {
        return Err("meter provider already initialized".into());
    }
    global::set_meter_provider(provider);
    Ok(())
}

/// Install the global subscriber: optional OTel layer, env filter, optional JSON fmt layer
fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush telemetry before exit
///
/// Shuts down the tracer and meter providers installed by
/// [`init_observability`], exporting the last span batch and metric
/// reading. Only the first call does anything.
pub fn shutdown_observability() {
    if SHUT_DOWN.swap(true, Ordering::SeqCst) {
        return;
    }
    tracing::info!("Shutting down observability");
    shutdown_providers(TRACER_PROVIDER.get(), METER_PROVIDER.get());
}

fn shutdown_providers(tracer: Option<&SdkTracerProvider>, meter: Option<&SdkMeterProvider>) {
    if let Some(provider) = tracer {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(provider) = meter {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "jrd");
        assert!(!config.enable_traces);
        assert!(!config.enable_metrics);
        assert!(config.enable_logs);
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig::new("test-service")
            .with_endpoint("http://custom:4317")
            .with_log_level("debug")
            .with_version("1.0.0")
            .with_traces(true)
            .with_metrics(true);

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.otlp_endpoint, "http://custom:4317");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_version, "1.0.0");
        assert!(config.enable_traces);
        assert!(config.enable_metrics);
    }

    #[test]
    fn test_init_without_exporters() {
        // Only the local subscriber is installed; no collector is contacted
        let config = ObservabilityConfig::new("test-local")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(false);

        assert!(init_observability(config.clone()).is_ok());
        // The global subscriber can only be installed once
        assert!(init_observability(config).is_err());
    }

    #[test]
    fn test_shutdown_idempotent() {
        shutdown_observability();
        shutdown_observability();
        assert!(SHUT_DOWN.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_providers_shuts_both_down() {
        let tracer = SdkTracerProvider::builder().build();
        let meter = SdkMeterProvider::builder().build();

        shutdown_providers(Some(&tracer), Some(&meter));

        // A provider that was already shut down refuses a second shutdown
        assert!(tracer.shutdown().is_err());
        assert!(meter.shutdown().is_err());
    }
}
