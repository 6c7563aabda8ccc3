//! Prometheus metrics for the gateway.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `turnstile_requests_total` | Counter | `route`, `status` |
//! | `turnstile_request_duration_seconds` | Histogram | `route` |
//! | `turnstile_auth_rejections_total` | Counter | `reason` |
//! | `turnstile_upstream_errors_total` | Counter | `route`, `kind` |
//! | `turnstile_in_flight_requests` | Gauge | - |
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.
//! Requests that match no route are labelled with [`UNMATCHED_ROUTE`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metric names.
pub mod names {
    /// Completed requests.
    pub const REQUESTS_TOTAL: &str = "turnstile_requests_total";
    /// End-to-end request latency.
    pub const REQUEST_DURATION: &str = "turnstile_request_duration_seconds";
    /// Authentication rejections.
    pub const AUTH_REJECTIONS_TOTAL: &str = "turnstile_auth_rejections_total";
    /// Failed upstream calls.
    pub const UPSTREAM_ERRORS_TOTAL: &str = "turnstile_upstream_errors_total";
    /// Requests currently being processed.
    pub const IN_FLIGHT: &str = "turnstile_in_flight_requests";
}

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install the exporter.
    pub enabled: bool,

    /// Listen address of the Prometheus scrape endpoint.
    pub addr: String,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            // 1ms .. 30s; upstream timeouts land in the last bucket.
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

fn exporter_builder(config: &MetricsConfig) -> TelemetryResult<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Installs the global Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidAddress`] for an unparsable address and
/// [`TelemetryError::MetricsInit`] if the exporter cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    exporter_builder(config)?
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Total number of requests handled by the gateway");
    describe_histogram!(
        names::REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Request duration including the upstream call"
    );
    describe_counter!(
        names::AUTH_REJECTIONS_TOTAL,
        "Requests rejected with 401, by internal reason"
    );
    describe_counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "Upstream calls that failed or timed out"
    );
    describe_gauge!(names::IN_FLIGHT, "Requests currently being processed");
}

/// Records a completed request.
pub fn record_request(route: &str, status_code: u16, duration: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(names::REQUEST_DURATION, "route" => route.to_string())
        .record(duration.as_secs_f64());
}

/// Records an authentication rejection.
///
/// `reason` is one of `missing_token`, `malformed`, `invalid_signature`,
/// `expired`.
pub fn record_auth_rejection(reason: &'static str) {
    counter!(names::AUTH_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Records a failed upstream call. `kind` is `unavailable` or `timeout`.
pub fn record_upstream_error(route: &str, kind: &'static str) {
    counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "route" => route.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Holds the in-flight gauge up for the lifetime of a request.
///
/// The gauge is decremented on drop, so a cancelled request is still counted
/// out.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT).decrement(1.0);
    }
}
