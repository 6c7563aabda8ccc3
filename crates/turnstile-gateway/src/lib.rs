//! Turnstile - edge gateway for the expense tracker platform
//!
//! Turnstile is the single entry point in front of the user, expense, budget
//! and currency services. Every request is matched against an ordered route
//! table, authenticated with an HS256 bearer token when the route demands it,
//! and relayed to the matched upstream with the caller's identity attached.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────── turnstile ────────────────────────┐
//!                │                                                           │
//!   client ────► │  RouteTable ──► AuthenticationMiddleware ──► Forwarder    │ ────► upstream
//!          ◄──── │   (404)            (401, X-User-Name)       (502 / 504)   │ ◄────
//!                │                                                           │
//!                └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Upstream services trust `X-User-Name` only because the gateway strips any
//! client-supplied copy and sets it from a verified token.
//!
//! # Example Usage
//!
//! ```bash
//! # Run with a configuration file
//! $ turnstile --config /etc/turnstile/gateway.toml
//!
//! # Validate configuration and print the route table
//! $ turnstile --config /etc/turnstile/gateway.toml --check
//!
//! # Environment variables override the file
//! $ TURNSTILE_JWT_SECRET=... TURNSTILE_LISTEN_PORT=8080 turnstile
//! ```

#![doc(html_root_url = "https://docs.rs/turnstile-gateway/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod headers;
pub mod server;
pub mod shutdown;

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use forwarder::{RequestForwarder, UpstreamResponse};
pub use handler::Gateway;
pub use server::GatewayServer;
pub use shutdown::{ShutdownReceiver, ShutdownSignal};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
