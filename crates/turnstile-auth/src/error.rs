//! Token validation errors.

use thiserror::Error;

/// Reasons a bearer token can be refused.
///
/// All variants collapse to the same `401 Unauthorized` response at the edge.
/// The distinction only exists for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No `Authorization` header, a non-`Bearer` scheme, or an empty token.
    #[error("missing bearer token")]
    MissingToken,

    /// The token is not a decodable JWS, or its claims are unusable.
    #[error("malformed token")]
    Malformed,

    /// The signature does not verify against the shared key.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The expiry claim is in the past.
    #[error("token expired")]
    Expired,
}

impl TokenError {
    /// Stable label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
        }
    }
}
