//! Observability for the Turnstile gateway.
//!
//! - **Logging**: structured `tracing` output, JSON in production
//! - **Metrics**: Prometheus counters and histograms via the `metrics` crate
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                turnstile-gateway             │
//! │                                              │
//! │   tracing::info!/warn!      record_*()       │
//! │          │                      │            │
//! └──────────┼──────────────────────┼────────────┘
//!            ▼                      ▼
//!   ┌─────────────────┐   ┌───────────────────┐
//!   │ fmt subscriber  │   │ Prometheus        │
//!   │ (JSON / pretty) │   │ recorder          │
//!   └────────┬────────┘   └─────────┬─────────┘
//!            ▼                      ▼
//!         stdout             GET metrics_addr
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use turnstile_telemetry::{init_telemetry, LogConfig, MetricsConfig, TelemetryConfig};
//!
//! let config = TelemetryConfig {
//!     logging: LogConfig::production(),
//!     metrics: MetricsConfig { enabled: true, ..MetricsConfig::default() },
//! };
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{
    init_metrics, record_auth_rejection, record_request, record_upstream_error, InFlightGuard,
    MetricsConfig, UNMATCHED_ROUTE,
};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Configuration for both subsystems.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns the first subsystem error.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}
