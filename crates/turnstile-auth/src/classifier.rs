//! Public path classification.
//!
//! A fixed allowlist decides which paths skip authentication. Two matching
//! modes are mixed:
//!
//! | Pattern          | Mode      |
//! |------------------|-----------|
//! | `/api/auth/`     | prefix    |
//! | `/health`        | substring |
//! | `/swagger-ui`    | substring |
//! | `/v3/api-docs`   | substring |
//! | `/api-docs`      | substring |
//!
//! Substring mode means `/api/expenses/health` and `/api/users/healthy` are
//! public too.

/// Path prefix of the login and registration endpoints.
pub const AUTH_PREFIX: &str = "/api/auth/";

/// Fragments that make any path containing them public.
pub const PUBLIC_FRAGMENTS: [&str; 4] = ["/health", "/swagger-ui", "/v3/api-docs", "/api-docs"];

/// Decides whether a request path needs a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassifier {
    prefixes: Vec<String>,
    fragments: Vec<String>,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self {
            prefixes: vec![AUTH_PREFIX.to_string()],
            fragments: PUBLIC_FRAGMENTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl PathClassifier {
    /// Creates the classifier with the standard public path set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier from explicit pattern lists.
    ///
    /// Paths starting with any of `prefixes`, or containing any of
    /// `fragments`, are public.
    pub fn with_patterns<P, F>(prefixes: P, fragments: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `path` may be served without a token.
    pub fn is_public(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.fragments.iter().any(|f| path.contains(f.as_str()))
    }

    /// Prefix patterns.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Substring patterns.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}
