//! Route table errors.

use thiserror::Error;

/// Errors raised while building a route table.
///
/// These only occur at startup. Resolving a path never fails; an unknown path
/// simply has no route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The path pattern is not usable.
    #[error("invalid path pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A route was defined without a name.
    #[error("route name must not be empty")]
    EmptyName,

    /// Two routes share a name.
    #[error("duplicate route name `{0}`")]
    DuplicateName(String),

    /// The upstream base URL is not an absolute `http`/`https` URL.
    #[error("route `{route}` has invalid upstream `{upstream}`: {reason}")]
    InvalidUpstream {
        /// Route name.
        route: String,
        /// The configured upstream.
        upstream: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A rewritten request target could not be turned into a URI.
    #[error("cannot build upstream URI from `{0}`")]
    InvalidTarget(String),
}

impl RouteError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: &'static str) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_upstream(route: &str, upstream: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUpstream {
            route: route.to_string(),
            upstream: upstream.to_string(),
            reason: reason.into(),
        }
    }
}
