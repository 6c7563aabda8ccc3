//! The ordered route table.

use std::collections::HashSet;

use tracing::warn;

use crate::error::RouteError;
use crate::route::{Route, RouteDefinition};

/// Ordered, immutable list of routes.
///
/// Resolution walks the list top to bottom and returns the first route whose
/// pattern matches. Specificity plays no part: a broad pattern registered
/// early hides narrower ones registered after it.
///
/// # Example
///
/// ```rust
/// use turnstile_router::{RouteDefinition, RouteTable};
///
/// let table = RouteTable::from_definitions(&[
///     RouteDefinition::new("users", "/api/users/**", "http://localhost:8081"),
///     RouteDefinition::new("admin", "/api/users/admin/**", "http://localhost:9000"),
/// ])
/// .unwrap();
///
/// // First match wins, so "admin" is never selected.
/// assert_eq!(table.resolve("/api/users/admin/5").unwrap().name(), "users");
/// assert!(table.resolve("/api/unknown").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Builds a table from validated routes, keeping their order.
    ///
    /// Routes that can never be selected because an earlier route covers them
    /// are logged at WARN but kept.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::DuplicateName`] if two routes share a name.
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteError> {
        let mut seen = HashSet::with_capacity(routes.len());
        for route in &routes {
            if !seen.insert(route.name()) {
                return Err(RouteError::DuplicateName(route.name().to_string()));
            }
        }

        let table = Self { routes };
        for (hidden, by) in table.shadowed() {
            warn!(
                route = hidden.name(),
                pattern = %hidden.pattern(),
                shadowed_by = by.name(),
                "route is unreachable; an earlier route matches every path it does"
            );
        }
        Ok(table)
    }

    /// Validates and builds a table from configuration entries.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn from_definitions(defs: &[RouteDefinition]) -> Result<Self, RouteError> {
        let routes = defs
            .iter()
            .map(Route::from_definition)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(routes)
    }

    /// Returns the first route matching `path`.
    ///
    /// `path` is the request path without its query string.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    /// Pairs of `(unreachable, earlier)` routes.
    pub fn shadowed(&self) -> Vec<(&Route, &Route)> {
        let mut out = Vec::new();
        for (i, later) in self.routes.iter().enumerate() {
            if let Some(earlier) = self.routes[..i]
                .iter()
                .find(|earlier| earlier.pattern().covers(later.pattern()))
            {
                out.push((later, earlier));
            }
        }
        out
    }

    /// Looks up a route by name.
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name() == name)
    }

    /// Routes in resolution order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The expense tracker deployment's routes, in resolution order.
pub fn default_definitions() -> Vec<RouteDefinition> {
    const USERS: &str = "http://localhost:8081";
    const EXPENSES: &str = "http://localhost:8082";
    const BUDGETS: &str = "http://localhost:8083";
    const CURRENCY: &str = "http://localhost:3000";

    vec![
        RouteDefinition::new("user-service-auth", "/api/auth/**", USERS).public(),
        RouteDefinition::new("user-service", "/api/users/**", USERS),
        RouteDefinition::new("expense-service", "/api/expenses/**", EXPENSES),
        RouteDefinition::new("budget-service", "/api/budgets/**", BUDGETS),
        RouteDefinition::new("currency-service", "/api/currency/**", CURRENCY),
        RouteDefinition::new("user-service-docs", "/user-service/v3/api-docs/**", USERS)
            .public()
            .strip_prefix(1),
        RouteDefinition::new("expense-service-docs", "/expense-service/v3/api-docs/**", EXPENSES)
            .public()
            .strip_prefix(1),
        RouteDefinition::new("budget-service-docs", "/budget-service/v3/api-docs/**", BUDGETS)
            .public()
            .strip_prefix(1),
        RouteDefinition::new("currency-service-docs", "/currency-service/api-docs/**", CURRENCY)
            .public()
            .strip_prefix(1),
        RouteDefinition::new("health-checks", "/health/**", USERS).public(),
        RouteDefinition::new("actuator-health", "/actuator/health/**", USERS).public(),
    ]
}
