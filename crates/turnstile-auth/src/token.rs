//! Bearer token validation.
//!
//! Tokens are compact JWS strings signed with a pre-shared HMAC key. The
//! issuing service chooses HS256, HS384 or HS512 depending on key length, so
//! all three are accepted. Expiry is judged against an injected [`Clock`]
//! rather than the library's own notion of "now", which keeps validation
//! deterministic for a fixed time.
//!
//! Checks run in a fixed order: structure, signature, claims, expiry. A
//! tampered token therefore always reports [`TokenError::InvalidSignature`],
//! whatever else is wrong with it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// Smallest accepted HMAC secret, in bytes (256 bits).
pub const MIN_SECRET_LEN: usize = 32;

/// Algorithms a token may be signed with.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// The validated `sub` claim of a token.
///
/// Treated as an opaque identity string. It is guaranteed to be non-empty and
/// representable as an HTTP header value.
#[derive(Clone, PartialEq, Eq)]
pub struct Subject {
    raw: String,
    header: HeaderValue,
}

impl Subject {
    /// Wraps a subject string, rejecting values that cannot travel in a header.
    pub fn new(raw: impl Into<String>) -> Result<Self, TokenError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TokenError::Malformed);
        }
        let header = HeaderValue::from_str(&raw).map_err(|_| TokenError::Malformed)?;
        Ok(Self { raw, header })
    }

    /// The subject as received in the token.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The subject as an identity header value.
    pub fn header_value(&self) -> &HeaderValue {
        &self.header
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subject").field(&self.raw).finish()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Claims the gateway reads. Anything else in the payload is ignored.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Verifies bearer tokens against the shared signing key.
///
/// Built once at startup and shared read-only by every request.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
    leeway_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    /// Creates a validator for tokens signed with `secret`.
    ///
    /// The secret is used as raw bytes. Length is not checked here; callers
    /// loading configuration should enforce [`MIN_SECRET_LEN`].
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        // Expiry is checked against our own clock after decoding.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
            leeway_secs: 0,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Tolerates tokens that expired at most `leeway` ago.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway_secs = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Validates `token` and returns its subject.
    pub fn validate(&self, token: &str) -> Result<Subject, TokenError> {
        if token.is_empty() {
            return Err(TokenError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected by decoder");
            classify_decode_error(e.kind())
        })?;

        let now = self.clock.now().timestamp();
        if now > data.claims.exp.saturating_add(self.leeway_secs) {
            return Err(TokenError::Expired);
        }

        Subject::new(data.claims.sub)
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

fn classify_decode_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    }
}
