//! Routes and path rewriting.

use http::uri::{PathAndQuery, Scheme};
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::pattern::PathPattern;

/// A route as written in configuration.
///
/// ```toml
/// [[routes]]
/// name = "expense-service"
/// path_pattern = "/api/expenses/**"
/// requires_auth = true
/// upstream = "http://localhost:8082"
/// strip_prefix = 0
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Unique route name, used in logs and metrics.
    pub name: String,
    /// Pattern matched against the request path.
    pub path_pattern: String,
    /// Whether a bearer token is needed.
    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,
    /// Base URL of the upstream service.
    pub upstream: String,
    /// Leading path segments to drop before forwarding.
    #[serde(default)]
    pub strip_prefix: usize,
}

fn default_requires_auth() -> bool {
    true
}

impl RouteDefinition {
    /// Creates a protected route definition that forwards paths unchanged.
    pub fn new(
        name: impl Into<String>,
        path_pattern: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path_pattern: path_pattern.into(),
            requires_auth: true,
            upstream: upstream.into(),
            strip_prefix: 0,
        }
    }

    /// Marks the route as not requiring authentication.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Sets the number of leading segments to strip.
    #[must_use]
    pub fn strip_prefix(mut self, segments: usize) -> Self {
        self.strip_prefix = segments;
        self
    }
}

/// A validated, immutable route.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    pattern: PathPattern,
    requires_auth: bool,
    upstream: Uri,
    strip_prefix: usize,
}

impl Route {
    /// Validates a definition.
    ///
    /// # Errors
    ///
    /// Fails on an empty name, a bad pattern, or an upstream that is not an
    /// absolute `http`/`https` URL with a host and no path.
    pub fn from_definition(def: &RouteDefinition) -> Result<Self, RouteError> {
        if def.name.trim().is_empty() {
            return Err(RouteError::EmptyName);
        }
        let pattern = PathPattern::parse(&def.path_pattern)?;
        let upstream = parse_upstream(&def.name, &def.upstream)?;

        Ok(Self {
            name: def.name.clone(),
            pattern,
            requires_auth: def.requires_auth,
            upstream,
            strip_prefix: def.strip_prefix,
        })
    }

    /// Route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Whether the route demands a bearer token.
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Upstream base URL (scheme and authority only).
    pub fn upstream(&self) -> &Uri {
        &self.upstream
    }

    /// Number of leading segments stripped before forwarding.
    pub fn strip_prefix_count(&self) -> usize {
        self.strip_prefix
    }

    /// Returns `true` if the route handles `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    /// Builds the upstream URI for an inbound request target.
    ///
    /// The path is rewritten by [`strip_prefix`]; the query, if any, is
    /// carried over untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidTarget`] if the rewritten target is not a
    /// valid URI path.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, RouteError> {
        let path = strip_prefix(path, self.strip_prefix);
        let target = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let path_and_query = PathAndQuery::try_from(target.as_str())
            .map_err(|_| RouteError::InvalidTarget(target.clone()))?;

        let mut parts = self.upstream.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts).map_err(|_| RouteError::InvalidTarget(target))
    }
}

/// Removes the first `count` segments from `path`.
///
/// Empty segments are ignored, the result always starts with `/`, and a
/// trailing slash survives unless the result is the root. A `count` of zero
/// returns the path unchanged.
///
/// ```
/// use turnstile_router::strip_prefix;
///
/// assert_eq!(strip_prefix("/user-service/v3/api-docs", 1), "/v3/api-docs");
/// assert_eq!(strip_prefix("/a/b/", 1), "/b/");
/// assert_eq!(strip_prefix("/a", 3), "/");
/// ```
pub fn strip_prefix(path: &str, count: usize) -> String {
    if count == 0 {
        return path.to_string();
    }

    let mut out = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()).skip(count) {
        out.push('/');
        out.push_str(segment);
    }

    if out.is_empty() {
        out.push('/');
    } else if path.ends_with('/') {
        out.push('/');
    }
    out
}

fn parse_upstream(route: &str, raw: &str) -> Result<Uri, RouteError> {
    let uri: Uri = raw
        .parse()
        .map_err(|e: http::uri::InvalidUri| RouteError::invalid_upstream(route, raw, e.to_string()))?;

    match uri.scheme() {
        Some(s) if *s == Scheme::HTTP || *s == Scheme::HTTPS => {}
        _ => return Err(RouteError::invalid_upstream(route, raw, "scheme must be http or https")),
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(RouteError::invalid_upstream(route, raw, "missing host"));
    }
    if let Some(pq) = uri.path_and_query() {
        if pq.as_str() != "/" && !pq.as_str().is_empty() {
            return Err(RouteError::invalid_upstream(
                route,
                raw,
                "must not have a path or query",
            ));
        }
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn route(def: RouteDefinition) -> Route {
        Route::from_definition(&def).unwrap()
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("/user-service/v3/api-docs", 1), "/v3/api-docs");
        assert_eq!(
            strip_prefix("/expense-service/v3/api-docs/swagger-config", 1),
            "/v3/api-docs/swagger-config"
        );
        assert_eq!(strip_prefix("/a/b/c", 2), "/c");
        assert_eq!(strip_prefix("/a/b/", 1), "/b/");
        assert_eq!(strip_prefix("/a/", 1), "/");
        assert_eq!(strip_prefix("/a", 5), "/");
        assert_eq!(strip_prefix("//a//b", 1), "/b");
    }

    #[test]
    fn test_strip_zero_is_identity() {
        assert_eq!(strip_prefix("/api/expenses/", 0), "/api/expenses/");
        assert_eq!(strip_prefix("//odd//path", 0), "//odd//path");
    }

    #[test]
    fn test_upstream_uri_keeps_query() {
        let r = route(RouteDefinition::new("e", "/api/expenses/**", "http://localhost:8082"));
        let uri = r.upstream_uri("/api/expenses", Some("from=2024-01-01&to=2024-02-01")).unwrap();
        assert_eq!(
            uri.to_string(),
            "http://localhost:8082/api/expenses?from=2024-01-01&to=2024-02-01"
        );
    }

    #[test]
    fn test_upstream_uri_strips_segments() {
        let r = route(
            RouteDefinition::new("docs", "/user-service/v3/api-docs/**", "http://localhost:8081")
                .public()
                .strip_prefix(1),
        );
        let uri = r.upstream_uri("/user-service/v3/api-docs", None).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8081/v3/api-docs");
        assert!(!r.requires_auth());
        assert_eq!(r.strip_prefix_count(), 1);
    }

    #[test]
    fn test_upstream_with_trailing_slash_is_accepted() {
        let r = route(RouteDefinition::new("b", "/api/budgets/**", "https://budgets.internal:8443/"));
        let uri = r.upstream_uri("/api/budgets/3", None).unwrap();
        assert_eq!(uri.to_string(), "https://budgets.internal:8443/api/budgets/3");
    }

    #[test]
    fn test_invalid_definitions() {
        let bad = [
            RouteDefinition::new("", "/a/**", "http://localhost:1"),
            RouteDefinition::new("x", "a/**", "http://localhost:1"),
            RouteDefinition::new("x", "/a/**", "localhost:1"),
            RouteDefinition::new("x", "/a/**", "ftp://localhost"),
            RouteDefinition::new("x", "/a/**", "/relative"),
            RouteDefinition::new("x", "/a/**", "http://localhost:1/base"),
        ];
        for def in bad {
            assert!(Route::from_definition(&def).is_err(), "{def:?}");
        }
    }

    #[test]
    fn test_definition_serde_defaults() {
        let def: RouteDefinition = serde_json::from_str(
            r#"{"name":"u","path_pattern":"/api/users/**","upstream":"http://localhost:8081"}"#,
        )
        .unwrap();
        assert!(def.requires_auth);
        assert_eq!(def.strip_prefix, 0);

        let def: RouteDefinition = toml::from_str(
            r#"
            name = "docs"
            path_pattern = "/currency-service/api-docs/**"
            requires_auth = false
            upstream = "http://localhost:3000"
            strip_prefix = 1
            "#,
        )
        .unwrap();
        let expected =
            RouteDefinition::new("docs", "/currency-service/api-docs/**", "http://localhost:3000")
                .public()
                .strip_prefix(1);
        assert_eq!(def, expected);
    }

    proptest! {
        #[test]
        fn prop_strip_removes_exactly_n_segments(
            segments in proptest::collection::vec("[a-z0-9-]{1,8}", 0..6),
            n in 1usize..8,
        ) {
            let path = format!("/{}", segments.join("/"));
            let stripped = strip_prefix(&path, n);
            let remaining: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
            let expected: Vec<&str> = segments.iter().skip(n).map(String::as_str).collect();
            prop_assert_eq!(remaining, expected);
            prop_assert!(stripped.starts_with('/'));
        }

        #[test]
        fn prop_strip_keeps_trailing_slash(
            segments in proptest::collection::vec("[a-z]{1,5}", 2..6),
        ) {
            let path = format!("/{}/", segments.join("/"));
            prop_assert!(strip_prefix(&path, 1).ends_with('/'));
            prop_assert!(!strip_prefix(&path, 1).ends_with("//"));
        }
    }
}
