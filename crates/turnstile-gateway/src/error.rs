//! Error types for the Turnstile gateway.

use std::fmt;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;
use turnstile_auth::TokenError;
use turnstile_router::RouteError;

/// Gateway errors.
///
/// The `Display` text is for logs. Clients only ever see
/// [`GatewayError::client_message`], which never carries internal detail.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Authentication failed. The reason stays internal.
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] TokenError),

    /// No route matches the request path.
    #[error("No route for path: {path}")]
    UnroutablePath {
        /// Request path.
        path: String,
    },

    /// The upstream could not be reached or failed mid-exchange.
    #[error("Upstream `{route}` unavailable: {message}")]
    UpstreamUnavailable {
        /// Route name.
        route: String,
        /// Transport error text.
        message: String,
    },

    /// The upstream did not answer within the deadline.
    #[error("Upstream `{route}` timed out after {timeout:?}")]
    UpstreamTimeout {
        /// Route name.
        route: String,
        /// Configured deadline.
        timeout: Duration,
    },

    /// The inbound request could not be read or rewritten.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// The inbound body exceeds the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Limit in bytes.
        limit: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Invalid route table.
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    /// Server startup or runtime error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Create an unroutable path error.
    pub fn unroutable(path: impl Into<String>) -> Self {
        Self::UnroutablePath { path: path.into() }
    }

    /// Create an upstream unavailable error.
    pub fn upstream_unavailable(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            route: route.into(),
            message: message.into(),
        }
    }

    /// Create an upstream timeout error.
    pub fn upstream_timeout(route: impl Into<String>, timeout: Duration) -> Self {
        Self::UpstreamTimeout {
            route: route.into(),
            timeout,
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::UnroutablePath { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Category label for responses and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::UnroutablePath { .. } => "not_found",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::BadRequest { .. } => "bad_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Config { .. } | Self::Route(_) => "config",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
        }
    }

    /// Message safe to return to the client.
    pub fn client_message(&self) -> String {
        match self {
            // Identical for every reason so the validator cannot be probed.
            Self::Unauthorized(_) => "Authentication required".to_string(),
            Self::UnroutablePath { .. } => "No route matches the request path".to_string(),
            Self::UpstreamUnavailable { .. } => "Upstream service unavailable".to_string(),
            Self::UpstreamTimeout { .. } => "Upstream service timed out".to_string(),
            Self::BadRequest { .. } => "Malformed request".to_string(),
            Self::PayloadTooLarge { limit } => {
                format!("Request body exceeds the {limit} byte limit")
            }
            Self::Config { .. } | Self::Route(_) | Self::Server { .. } | Self::Io(_) => {
                "Internal gateway error".to_string()
            }
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON body of gateway-generated error responses.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation with gateway logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        Self::new(err.category(), err.client_message())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
