//! Ordered route table for the Turnstile gateway.
//!
//! Maps an inbound request path to the upstream service that handles it,
//! together with the route's authentication requirement and path rewrite.
//!
//! # Features
//!
//! - **First-match-wins**: routes are evaluated in registration order
//! - **Segment-aware patterns**: `/api/users/**` covers `/api/users` and below
//! - **Prefix stripping**: drop leading segments before forwarding
//! - **Shadow detection**: unreachable routes are reported at startup
//!
//! # Example
//!
//! ```rust
//! use turnstile_router::{default_definitions, RouteTable};
//!
//! let table = RouteTable::from_definitions(&default_definitions()).unwrap();
//!
//! let route = table.resolve("/user-service/v3/api-docs").unwrap();
//! assert_eq!(route.name(), "user-service-docs");
//! assert!(!route.requires_auth());
//!
//! let uri = route.upstream_uri("/user-service/v3/api-docs", None).unwrap();
//! assert_eq!(uri, "http://localhost:8081/v3/api-docs");
//! ```
//!
//! # Resolution
//!
//! ```text
//! path ──► route[0] ──no──► route[1] ──no──► ... ──no──► None (404)
//!             │yes             │yes
//!             ▼                ▼
//!          Some(route)      Some(route)
//! ```
//!
//! The table is built once at startup and shared read-only afterwards.

#![doc(html_root_url = "https://docs.rs/turnstile-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod pattern;
mod route;
mod table;

pub use error::RouteError;
pub use pattern::PathPattern;
pub use route::{strip_prefix, Route, RouteDefinition};
pub use table::{default_definitions, RouteTable};
