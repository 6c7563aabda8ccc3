//! Authentication middleware.
//!
//! Each inbound request walks a small state machine exactly once:
//!
//! ```text
//! Start ──► Classified ──(public)──────────────────────────────► Forwarded
//!               │
//!               └─(protected)─► TokenExtracted ──► Validated ──► Forwarded
//!                      │               │
//!                      └───────────────┴──► Rejected ──► Terminated
//! ```
//!
//! `Forwarded` and `Terminated` are the only terminal states. A request that
//! ends in `Terminated` never reaches an upstream.
//!
//! Every state is a variant of [`AuthState`] and [`AuthState::step`] performs
//! one transition, so each edge can be exercised on its own. Callers that just
//! want the result use [`AuthenticationMiddleware::authenticate`].

use http::header::{HeaderMap, HeaderName, AUTHORIZATION};
use http::{Request, StatusCode};
use tracing::{trace, warn};

use crate::classifier::PathClassifier;
use crate::error::TokenError;
use crate::token::{Subject, TokenValidator};

/// Header carrying the authenticated subject to upstream services.
pub static IDENTITY_HEADER: HeaderName = HeaderName::from_static("x-user-name");

/// Literal scheme prefix of a bearer credential.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Whether a request needs a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Served without authentication.
    Public,
    /// Requires a valid bearer token.
    Protected,
}

/// Outcome of authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// The path is public; no identity is attached.
    Public,
    /// A valid token was presented.
    Authenticated {
        /// The token's subject claim.
        subject: Subject,
    },
    /// The request must not be forwarded.
    Rejected {
        /// Internal reason. Never sent to the client.
        reason: TokenError,
    },
}

/// A request cleared for forwarding.
///
/// Any client-supplied identity header has been removed. If the request was
/// authenticated, exactly one identity header carrying the subject is present.
#[derive(Debug)]
pub struct ForwardedRequest<B> {
    request: Request<B>,
    subject: Option<Subject>,
}

impl<B> ForwardedRequest<B> {
    fn public(mut request: Request<B>) -> Self {
        request.headers_mut().remove(&IDENTITY_HEADER);
        Self {
            request,
            subject: None,
        }
    }

    fn authenticated(mut request: Request<B>, subject: Subject) -> Self {
        // insert() replaces every existing value, so spoofed duplicates go too.
        request
            .headers_mut()
            .insert(IDENTITY_HEADER.clone(), subject.header_value().clone());
        Self {
            request,
            subject: Some(subject),
        }
    }

    /// The request as it will be forwarded.
    pub fn request(&self) -> &Request<B> {
        &self.request
    }

    /// The authenticated subject, if any.
    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    /// The decision that let this request through.
    pub fn decision(&self) -> AuthDecision {
        match &self.subject {
            Some(subject) => AuthDecision::Authenticated {
                subject: subject.clone(),
            },
            None => AuthDecision::Public,
        }
    }

    /// Consumes the wrapper, returning the request.
    pub fn into_request(self) -> Request<B> {
        self.request
    }

    /// Splits off the body so it can be read after the decision is made.
    ///
    /// The headers, including the identity header, stay sealed in the
    /// returned wrapper; put a body back with [`ForwardedRequest::with_body`].
    pub fn take_body(self) -> (ForwardedRequest<()>, B) {
        let (parts, body) = self.request.into_parts();
        let head = ForwardedRequest {
            request: Request::from_parts(parts, ()),
            subject: self.subject,
        };
        (head, body)
    }
}

impl ForwardedRequest<()> {
    /// Attaches a body to a request split by [`ForwardedRequest::take_body`].
    pub fn with_body<C>(self, body: C) -> ForwardedRequest<C> {
        ForwardedRequest {
            request: self.request.map(|()| body),
            subject: self.subject,
        }
    }
}

/// A request refused by the middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    reason: TokenError,
}

impl Rejection {
    /// Why the request was refused.
    pub fn reason(&self) -> TokenError {
        self.reason
    }

    /// Status code for the client. Identical for every reason.
    pub fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// Terminal result of the state machine.
#[derive(Debug)]
pub enum Outcome<B> {
    /// Hand the request to the forwarder.
    Forwarded(ForwardedRequest<B>),
    /// Respond with a rejection; the pipeline ends here.
    Terminated(Rejection),
}

impl<B> Outcome<B> {
    /// The decision this outcome embodies.
    pub fn decision(&self) -> AuthDecision {
        match self {
            Self::Forwarded(forwarded) => forwarded.decision(),
            Self::Terminated(rejection) => AuthDecision::Rejected {
                reason: rejection.reason(),
            },
        }
    }
}

/// One state of the per-request authentication machine.
#[derive(Debug)]
pub enum AuthState<B> {
    /// Raw request as received.
    Start {
        /// Inbound request.
        request: Request<B>,
        /// Whether the matched route demands authentication.
        route_requires_auth: bool,
    },
    /// Access level decided.
    Classified {
        /// Inbound request.
        request: Request<B>,
        /// Result of classification.
        access: Access,
    },
    /// A bearer token was found on a protected request.
    TokenExtracted {
        /// Inbound request.
        request: Request<B>,
        /// The raw token, without the scheme prefix.
        token: String,
    },
    /// The token verified.
    Validated {
        /// Inbound request.
        request: Request<B>,
        /// The token's subject.
        subject: Subject,
    },
    /// Authentication failed.
    Rejected {
        /// Internal reason.
        reason: TokenError,
    },
    /// Terminal: ready for the forwarder.
    Forwarded(ForwardedRequest<B>),
    /// Terminal: the client gets a 401.
    Terminated(Rejection),
}

impl<B> AuthState<B> {
    /// Entry state for a request.
    pub fn start(request: Request<B>, route_requires_auth: bool) -> Self {
        Self::Start {
            request,
            route_requires_auth,
        }
    }

    /// State name, for logs and assertions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Classified { .. } => "classified",
            Self::TokenExtracted { .. } => "token_extracted",
            Self::Validated { .. } => "validated",
            Self::Rejected { .. } => "rejected",
            Self::Forwarded(_) => "forwarded",
            Self::Terminated(_) => "terminated",
        }
    }

    /// Returns `true` for `Forwarded` and `Terminated`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Forwarded(_) | Self::Terminated(_))
    }

    /// Performs a single transition. Terminal states are returned unchanged.
    pub fn step(self, middleware: &AuthenticationMiddleware) -> Self {
        match self {
            Self::Start {
                request,
                route_requires_auth,
            } => {
                let access = middleware.classify(request.uri().path(), route_requires_auth);
                Self::Classified { request, access }
            }
            Self::Classified {
                request,
                access: Access::Public,
            } => Self::Forwarded(ForwardedRequest::public(request)),
            Self::Classified {
                request,
                access: Access::Protected,
            } => match extract_bearer(request.headers()) {
                Ok(token) => {
                    let token = token.to_string();
                    Self::TokenExtracted { request, token }
                }
                Err(reason) => Self::Rejected { reason },
            },
            Self::TokenExtracted { request, token } => {
                match middleware.validator.validate(&token) {
                    Ok(subject) => Self::Validated { request, subject },
                    Err(reason) => Self::Rejected { reason },
                }
            }
            Self::Validated { request, subject } => {
                Self::Forwarded(ForwardedRequest::authenticated(request, subject))
            }
            Self::Rejected { reason } => Self::Terminated(Rejection { reason }),
            terminal @ (Self::Forwarded(_) | Self::Terminated(_)) => terminal,
        }
    }
}

/// Reads the bearer token from the `Authorization` header.
///
/// A missing header, a non-UTF-8 value, a scheme other than the literal
/// `Bearer ` and an empty token all yield [`TokenError::MissingToken`].
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(TokenError::MissingToken)?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(TokenError::MissingToken),
    }
}

/// Authenticates requests before they are forwarded.
///
/// Holds only read-only state and is shared by all in-flight requests.
#[derive(Debug, Clone)]
pub struct AuthenticationMiddleware {
    classifier: PathClassifier,
    validator: TokenValidator,
}

impl AuthenticationMiddleware {
    /// Creates the middleware with the standard public path set.
    pub fn new(validator: TokenValidator) -> Self {
        Self {
            classifier: PathClassifier::default(),
            validator,
        }
    }

    /// Replaces the path classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: PathClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The path classifier in use.
    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// Decides the access level of a path on a route.
    ///
    /// Public if the route does not require authentication or the path is on
    /// the public allowlist.
    pub fn classify(&self, path: &str, route_requires_auth: bool) -> Access {
        if !route_requires_auth || self.classifier.is_public(path) {
            Access::Public
        } else {
            Access::Protected
        }
    }

    /// Runs the state machine to completion.
    pub fn authenticate<B>(&self, request: Request<B>, route_requires_auth: bool) -> Outcome<B> {
        let path = request.uri().path().to_string();
        let mut state = AuthState::start(request, route_requires_auth);

        loop {
            let from = state.name();
            state = state.step(self);
            trace!(from, to = state.name(), "auth transition");

            match state {
                AuthState::Forwarded(forwarded) => return Outcome::Forwarded(forwarded),
                AuthState::Terminated(rejection) => {
                    warn!(
                        path = %path,
                        reason = rejection.reason().reason(),
                        "authentication rejected"
                    );
                    return Outcome::Terminated(rejection);
                }
                other => state = other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "middleware-test-secret-0123456789abcdef";
    const NOW: i64 = 1_700_000_000;

    fn middleware() -> AuthenticationMiddleware {
        AuthenticationMiddleware::new(
            TokenValidator::new(SECRET).with_clock(FixedClock::from_timestamp(NOW)),
        )
    }

    fn token(sub: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({"sub": sub, "exp": exp}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn request(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    fn request_with_auth(path: &str, auth: &str) -> Request<()> {
        Request::builder()
            .uri(path)
            .header(AUTHORIZATION, auth)
            .body(())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(TokenError::MissingToken));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&headers), Ok("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), Err(TokenError::MissingToken));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer(&headers), Err(TokenError::MissingToken));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_bearer(&headers), Err(TokenError::MissingToken));
    }

    #[test]
    fn test_classify() {
        let mw = middleware();
        assert_eq!(mw.classify("/api/expenses", true), Access::Protected);
        assert_eq!(mw.classify("/api/expenses", false), Access::Public);
        assert_eq!(mw.classify("/api/expenses/health", true), Access::Public);
        assert_eq!(mw.classify("/api/auth/login", true), Access::Public);
    }

    #[test]
    fn test_custom_classifier_drives_classification() {
        let classifier = PathClassifier::with_patterns(["/open/"], ["/ping"]);
        let mw = middleware().with_classifier(classifier);
        assert_eq!(mw.classify("/open/terms", true), Access::Public);
        assert_eq!(mw.classify("/api/expenses/ping", true), Access::Public);
        assert_eq!(mw.classify("/api/auth/login", true), Access::Protected);
        assert!(matches!(
            mw.authenticate(request("/api/expenses/health"), true),
            Outcome::Terminated(_)
        ));
        assert!(matches!(
            mw.authenticate(request("/open/terms"), true),
            Outcome::Forwarded(_)
        ));
    }

    #[test]
    fn test_start_transitions_to_classified() {
        let mw = middleware();
        let state = AuthState::start(request("/api/budgets"), true).step(&mw);
        assert!(matches!(
            state,
            AuthState::Classified {
                access: Access::Protected,
                ..
            }
        ));
    }

    #[test]
    fn test_public_classification_forwards_directly() {
        let mw = middleware();
        let state = AuthState::Classified {
            request: request("/api/auth/login"),
            access: Access::Public,
        }
        .step(&mw);

        match state {
            AuthState::Forwarded(fwd) => {
                assert!(fwd.subject().is_none());
                assert!(!fwd.request().headers().contains_key(&IDENTITY_HEADER));
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_protected_without_token_is_rejected() {
        let mw = middleware();
        let state = AuthState::Classified {
            request: request("/api/expenses"),
            access: Access::Protected,
        }
        .step(&mw);
        assert!(matches!(
            state,
            AuthState::Rejected {
                reason: TokenError::MissingToken
            }
        ));
    }

    #[test]
    fn test_token_extracted_then_validated() {
        let mw = middleware();
        let t = token("alice", NOW + 60);
        let state = AuthState::Classified {
            request: request_with_auth("/api/expenses", &format!("Bearer {t}")),
            access: Access::Protected,
        }
        .step(&mw);
        assert_eq!(state.name(), "token_extracted");

        let state = state.step(&mw);
        match &state {
            AuthState::Validated { subject, .. } => assert_eq!(subject.as_str(), "alice"),
            other => panic!("unexpected state {}", other.name()),
        }

        let state = state.step(&mw);
        assert!(state.is_terminal());
        assert_eq!(state.name(), "forwarded");
    }

    #[test]
    fn test_rejected_terminates() {
        let mw = middleware();
        let state: AuthState<()> = AuthState::Rejected {
            reason: TokenError::Expired,
        }
        .step(&mw);
        match state {
            AuthState::Terminated(rejection) => {
                assert_eq!(rejection.reason(), TokenError::Expired);
                assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_terminal_states_are_fixed_points() {
        let mw = middleware();
        let state: AuthState<()> = AuthState::Terminated(Rejection {
            reason: TokenError::Malformed,
        });
        let state = state.step(&mw);
        assert_eq!(state.name(), "terminated");
    }

    #[test]
    fn test_authenticate_injects_identity_header() {
        let mw = middleware();
        let t = token("bob", NOW + 60);
        let outcome = mw.authenticate(request_with_auth("/api/budgets/7", &format!("Bearer {t}")), true);

        match outcome {
            Outcome::Forwarded(fwd) => {
                let values: Vec<_> = fwd
                    .request()
                    .headers()
                    .get_all(&IDENTITY_HEADER)
                    .iter()
                    .map(|v| v.to_str().unwrap())
                    .collect();
                assert_eq!(values, ["bob"]);
            }
            Outcome::Terminated(r) => panic!("rejected: {:?}", r.reason()),
        }
    }

    #[test]
    fn test_client_identity_header_is_overwritten() {
        let mw = middleware();
        let t = token("bob", NOW + 60);
        let req = Request::builder()
            .uri("/api/expenses")
            .header(AUTHORIZATION, format!("Bearer {t}"))
            .header("X-User-Name", "admin")
            .header("x-user-name", "root")
            .body(())
            .unwrap();

        let Outcome::Forwarded(fwd) = mw.authenticate(req, true) else {
            panic!("expected forwarded");
        };
        let values: Vec<_> = fwd
            .request()
            .headers()
            .get_all(&IDENTITY_HEADER)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, ["bob"]);
    }

    #[test]
    fn test_client_identity_header_is_stripped_on_public_paths() {
        let mw = middleware();
        let req = Request::builder()
            .uri("/api/auth/login")
            .header("X-User-Name", "admin")
            .body(())
            .unwrap();

        let Outcome::Forwarded(fwd) = mw.authenticate(req, false) else {
            panic!("expected forwarded");
        };
        assert!(!fwd.request().headers().contains_key(&IDENTITY_HEADER));
        assert_eq!(fwd.decision(), AuthDecision::Public);
    }

    #[test]
    fn test_public_request_keeps_other_headers() {
        let mw = middleware();
        let req = Request::builder()
            .uri("/actuator/health")
            .header("accept", "application/json")
            .header(AUTHORIZATION, "Bearer whatever")
            .body(())
            .unwrap();

        let Outcome::Forwarded(fwd) = mw.authenticate(req, false) else {
            panic!("expected forwarded");
        };
        let headers = fwd.request().headers();
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer whatever");
    }

    #[test]
    fn test_outcome_decision() {
        let mw = middleware();
        let outcome = mw.authenticate(request("/api/currency/rates"), true);
        assert_eq!(
            outcome.decision(),
            AuthDecision::Rejected {
                reason: TokenError::MissingToken
            }
        );

        let t = token("dave", NOW + 60);
        let outcome = mw.authenticate(request_with_auth("/api/currency/rates", &format!("Bearer {t}")), true);
        assert_eq!(
            outcome.decision(),
            AuthDecision::Authenticated {
                subject: Subject::new("dave").unwrap()
            }
        );
    }

    #[test]
    fn test_take_body_keeps_identity() {
        let mw = middleware();
        let t = token("frank", NOW + 60);
        let req = Request::builder()
            .uri("/api/expenses")
            .header(AUTHORIZATION, format!("Bearer {t}"))
            .body("payload")
            .unwrap();

        let Outcome::Forwarded(fwd) = mw.authenticate(req, true) else {
            panic!("expected forwarded");
        };
        let (head, body) = fwd.take_body();
        assert_eq!(body, "payload");

        let fwd = head.with_body(body.len());
        assert_eq!(fwd.subject().map(Subject::as_str), Some("frank"));
        assert_eq!(fwd.request().headers().get(&IDENTITY_HEADER).unwrap(), "frank");
        assert_eq!(*fwd.request().body(), 7);
    }
}
