//! Configuration for the Turnstile gateway.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use turnstile_auth::{TokenValidator, MIN_SECRET_LEN};
use turnstile_router::{default_definitions, RouteDefinition, RouteTable};
use turnstile_telemetry::logging::create_env_filter;
use turnstile_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

use crate::error::{GatewayError, GatewayResult};
use crate::forwarder::DEFAULT_MAX_RESPONSE_BODY;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "TURNSTILE_";

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and forwarding settings.
    pub server: ServerSettings,
    /// Token validation settings.
    pub auth: AuthSettings,
    /// Logging and metrics settings.
    pub telemetry: TelemetrySettings,
    /// Route table, in resolution order. Empty means the built-in table.
    pub routes: Vec<RouteDefinition>,
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GatewayError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `TURNSTILE_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, keyed by full variable name.
    ///
    /// Unparsable numeric values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(port) = var("LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }
        if let Some(addr) = var("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(secs) = var("UPSTREAM_TIMEOUT").and_then(|t| t.parse::<u64>().ok()) {
            self.server.upstream_timeout = Duration::from_secs(secs);
        }
        if let Some(secret) = var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(addr) = var("METRICS_ADDR") {
            self.telemetry.metrics_addr = addr;
        }

        self
    }

    /// Validate the configuration, including the route table.
    pub fn validate(&self) -> GatewayResult<()> {
        self.socket_addr()?;

        if self.auth.jwt_secret.is_empty() {
            return Err(GatewayError::config("auth.jwt_secret is required"));
        }
        if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(GatewayError::config(format!(
                "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.server.upstream_timeout.is_zero() {
            return Err(GatewayError::config("server.upstream_timeout must be positive"));
        }
        if self.server.max_request_body_size == 0 {
            return Err(GatewayError::config(
                "server.max_request_body_size must be positive",
            ));
        }
        if self.server.max_response_body_size == 0 {
            return Err(GatewayError::config(
                "server.max_response_body_size must be positive",
            ));
        }
        create_env_filter(&self.telemetry.log_level)
            .map_err(|e| GatewayError::config(e.to_string()))?;
        if self.telemetry.metrics_enabled {
            self.telemetry
                .metrics_addr
                .parse::<SocketAddr>()
                .map_err(|e| {
                    GatewayError::config(format!(
                        "invalid telemetry.metrics_addr `{}`: {e}",
                        self.telemetry.metrics_addr
                    ))
                })?;
        }

        self.route_table()?;
        Ok(())
    }

    /// Address the gateway listens on.
    pub fn socket_addr(&self) -> GatewayResult<SocketAddr> {
        let ip: IpAddr = self.server.listen_addr.parse().map_err(|e| {
            GatewayError::config(format!(
                "invalid server.listen_addr `{}`: {e}",
                self.server.listen_addr
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }

    /// Configured routes, or the built-in table when none are given.
    pub fn route_definitions(&self) -> Vec<RouteDefinition> {
        if self.routes.is_empty() {
            default_definitions()
        } else {
            self.routes.clone()
        }
    }

    /// Build the route table.
    pub fn route_table(&self) -> GatewayResult<RouteTable> {
        Ok(RouteTable::from_definitions(&self.route_definitions())?)
    }

    /// Build the token validator.
    pub fn token_validator(&self) -> TokenValidator {
        TokenValidator::new(self.auth.jwt_secret.as_bytes()).with_leeway(self.auth.clock_skew)
    }

    /// Telemetry settings in the form the telemetry crate expects.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let logging = if self.telemetry.json_logs {
            LogConfig::production()
        } else {
            LogConfig::development()
        }
        .with_level(self.telemetry.log_level.clone());

        TelemetryConfig {
            logging,
            metrics: MetricsConfig {
                enabled: self.telemetry.metrics_enabled,
                addr: self.telemetry.metrics_addr.clone(),
                ..MetricsConfig::default()
            },
        }
    }
}

/// Listener and forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Deadline for each upstream call.
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
    /// Maximum inbound body size in bytes.
    pub max_request_body_size: usize,
    /// Maximum upstream response body size in bytes.
    pub max_response_body_size: usize,
    /// How long to wait for in-flight connections on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            upstream_timeout: Duration::from_secs(30),
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            max_response_body_size: DEFAULT_MAX_RESPONSE_BODY,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Token validation settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Shared HMAC secret, used as raw UTF-8 bytes.
    pub jwt_secret: String,
    /// Tolerance applied to the expiry claim.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Log filter directive.
    pub log_level: String,
    /// JSON log lines instead of pretty output.
    pub json_logs: bool,
    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics listen address.
    pub metrics_addr: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: false,
            metrics_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.upstream_timeout = timeout;
        self
    }

    /// Set the inbound body limit.
    #[must_use]
    pub fn max_request_body_size(mut self, bytes: usize) -> Self {
        self.config.server.max_request_body_size = bytes;
        self
    }

    /// Set the upstream response body limit.
    #[must_use]
    pub fn max_response_body_size(mut self, bytes: usize) -> Self {
        self.config.server.max_response_body_size = bytes;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout = timeout;
        self
    }

    /// Set the token signing secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    /// Set the expiry tolerance.
    #[must_use]
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.config.auth.clock_skew = skew;
        self
    }

    /// Append a route.
    #[must_use]
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.config.routes.push(route);
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.telemetry.log_level = level.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> GatewayResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Durations written as `500ms`, `30s`, `5m`, `1h` or bare seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("invalid duration `{s}`");

        let (digits, scale): (&str, fn(u64) -> Duration) = if let Some(n) = s.strip_suffix("ms") {
            (n, Duration::from_millis)
        } else if let Some(n) = s.strip_suffix('s') {
            (n, Duration::from_secs)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, |m| Duration::from_secs(m.saturating_mul(60)))
        } else if let Some(n) = s.strip_suffix('h') {
            (n, |h| Duration::from_secs(h.saturating_mul(3600)))
        } else {
            (s, Duration::from_secs)
        };

        digits.trim().parse().map(scale).map_err(|_| invalid())
    }
}
