//! # Turnstile Auth
//!
//! Request authentication for the Turnstile gateway.
//!
//! Every request that reaches a protected route must present a bearer token
//! signed with the shared HMAC key. This crate decides, for one request at a
//! time, whether it may continue and under which identity.
//!
//! ## Flow
//!
//! ```text
//! Request → classify path → extract bearer → validate token → inject X-User-Name
//!                 │                 │                │
//!                 └─ public ──► forward              └─ any failure ──► 401
//! ```
//!
//! | Component                | Purpose                                    |
//! |--------------------------|--------------------------------------------|
//! | [`PathClassifier`]       | Public path allowlist                      |
//! | [`TokenValidator`]       | Signature, claims and expiry checks        |
//! | [`AuthenticationMiddleware`] | Runs the per-request state machine     |
//! | [`Clock`]                | Injectable time source for expiry          |
//!
//! ## Example
//!
//! ```
//! use turnstile_auth::{AuthenticationMiddleware, Outcome, TokenValidator};
//!
//! let validator = TokenValidator::new("a-shared-secret-of-at-least-32-bytes");
//! let auth = AuthenticationMiddleware::new(validator);
//!
//! let request = http::Request::builder()
//!     .uri("/api/auth/login")
//!     .body(())
//!     .unwrap();
//!
//! // Login is public: no token needed.
//! assert!(matches!(auth.authenticate(request, true), Outcome::Forwarded(_)));
//! ```

#![doc(html_root_url = "https://docs.rs/turnstile-auth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod classifier;
pub mod clock;
pub mod error;
pub mod middleware;
pub mod token;

pub use classifier::PathClassifier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::TokenError;
pub use middleware::{
    extract_bearer, Access, AuthDecision, AuthState, AuthenticationMiddleware, ForwardedRequest,
    Outcome, Rejection, IDENTITY_HEADER,
};
pub use token::{Subject, TokenValidator, MIN_SECRET_LEN};
