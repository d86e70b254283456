//! Dispatch metrics
//!
//! OpenTelemetry instruments recorded by the dispatcher when metrics are
//! enabled on the [`ServerBuilder`](crate::ServerBuilder). They are
//! exported through whatever meter provider `init_observability` installed;
//! without one the global no-op provider swallows them.
//!
//! # Metrics Collected
//!
//! - **jrd.dispatch.requests.total**: dispatched requests, by method and outcome (counter)
//! - **jrd.dispatch.duration**: dispatch latency in seconds (histogram)
//! - **jrd.dispatch.errors.total**: failed requests, by method and error kind (counter)
//! - **jrd.dispatch.notifications.total**: notifications received, by method (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrd_server::DispatchMetrics;
//!
//! let metrics = DispatchMetrics::new("my-service");
//! metrics.record_request("App.echo", "success", 0.002);
//! metrics.record_error("App.echo", "invalid_params");
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Dispatcher metrics instruments
pub struct DispatchMetrics {
    /// Total number of dispatched requests
    pub requests_total: Counter<u64>,
    /// Dispatch duration in seconds
    pub duration: Histogram<f64>,
    /// Total number of failed requests
    pub errors_total: Counter<u64>,
    /// Total number of notifications
    pub notifications_total: Counter<u64>,
}

impl DispatchMetrics {
    /// Create instruments on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let meter = global::meter_with_scope(
            opentelemetry::InstrumentationScope::builder(service_name.into()).build(),
        );
        Self::new_with_meter(&meter)
    }

    /// Create instruments on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("jrd.dispatch.requests.total")
                .with_description("Total number of dispatched JSON-RPC requests")
                .build(),
            duration: meter
                .f64_histogram("jrd.dispatch.duration")
                .with_description("Dispatch duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("jrd.dispatch.errors.total")
                .with_description("Total number of failed JSON-RPC requests")
                .build(),
            notifications_total: meter
                .u64_counter("jrd.dispatch.notifications.total")
                .with_description("Total number of JSON-RPC notifications")
                .build(),
        }
    }

    /// Record a finished dispatch
    pub fn record_request(&self, method: &str, outcome: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.duration.record(duration_secs, attributes);
    }

    /// Record a failure by error kind
    pub fn record_error(&self, method: &str, kind: &str) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("error_kind", kind.to_string()),
        ];
        self.errors_total.add(1, attributes);
    }

    /// Record an inbound notification
    pub fn record_notification(&self, method: &str) {
        self.notifications_total
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }
}
