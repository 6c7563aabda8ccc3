//! Path patterns.
//!
//! Two forms are supported:
//!
//! - `/api/users/**` matches `/api/users` and everything below it, on segment
//!   boundaries (`/api/usersx` does not match).
//! - `/health` matches exactly that path.
//!
//! `/**` on its own matches every path.

use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

const WILDCARD_SUFFIX: &str = "/**";

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    raw: String,
    /// Literal part before `/**`, or the whole pattern when exact.
    base: String,
    wildcard: bool,
}

impl PathPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidPattern`] if the pattern does not start with
    /// `/`, or uses `*` anywhere other than a trailing `/**`.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if !raw.starts_with('/') {
            return Err(RouteError::invalid_pattern(raw, "must start with `/`"));
        }

        let (base, wildcard) = match raw.strip_suffix(WILDCARD_SUFFIX) {
            Some(base) => (base, true),
            None => (raw, false),
        };

        if base.contains('*') {
            return Err(RouteError::invalid_pattern(
                raw,
                "`*` is only allowed as a trailing `/**`",
            ));
        }
        if base.contains(['?', '#']) {
            return Err(RouteError::invalid_pattern(raw, "must not contain a query or fragment"));
        }

        Ok(Self {
            raw: raw.to_string(),
            base: base.to_string(),
            wildcard,
        })
    }

    /// Returns `true` if `path` falls under this pattern.
    ///
    /// `path` must be the path component only, without a query string.
    pub fn matches(&self, path: &str) -> bool {
        if !self.wildcard {
            return path == self.base;
        }
        match path.strip_prefix(self.base.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.base.is_empty(),
            None => false,
        }
    }

    /// Returns `true` if every path matched by `other` is also matched by
    /// `self`, which means `other` can never win when registered after `self`.
    pub fn covers(&self, other: &Self) -> bool {
        if other.wildcard {
            self.wildcard && self.matches(&other.base)
        } else {
            self.matches(&other.base)
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern ends in `/**`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

impl FromStr for PathPattern {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
