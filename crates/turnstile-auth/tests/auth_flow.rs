//! End-to-end authentication flow tests.
//!
//! Drives [`AuthenticationMiddleware`] the way the gateway does: one request
//! in, one [`Outcome`] out. Covers the public allowlist, every rejection
//! reason, and identity header injection.

use std::time::Duration;

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderValue, Method, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use turnstile_auth::{
    AuthDecision, AuthenticationMiddleware, FixedClock, Outcome, PathClassifier, TokenError,
    TokenValidator, IDENTITY_HEADER,
};

const SECRET: &str = "integration-secret-for-auth-flow-0123456789";
const NOW: i64 = 1_750_000_000;

fn middleware() -> AuthenticationMiddleware {
    let validator = TokenValidator::new(SECRET).with_clock(FixedClock::from_timestamp(NOW));
    AuthenticationMiddleware::new(validator)
}

/// Signs a token with the shared secret.
fn mint(sub: &str, exp: i64) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &json!({"sub": sub, "exp": exp, "iat": NOW - 10}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Creates a request with an optional `Authorization` header.
fn make_request(method: Method, path: &str, auth: Option<&str>) -> Request<Bytes> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(value) = auth {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(Bytes::from_static(b"{\"amount\":12.5}")).unwrap()
}

fn rejection_reason(outcome: Outcome<Bytes>) -> TokenError {
    match outcome {
        Outcome::Terminated(rejection) => {
            assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
            rejection.reason()
        }
        Outcome::Forwarded(fwd) => panic!("forwarded {:?}", fwd.request().uri()),
    }
}

#[test]
fn test_public_paths_need_no_token() {
    let auth = middleware();
    for path in [
        "/api/auth/login",
        "/api/auth/register",
        "/health",
        "/actuator/health",
        "/user-service/v3/api-docs",
        "/currency-service/api-docs",
        "/swagger-ui/index.html",
    ] {
        let outcome = auth.authenticate(make_request(Method::GET, path, None), true);
        assert_eq!(outcome.decision(), AuthDecision::Public, "{path}");
    }
}

#[test]
fn test_route_without_auth_is_public() {
    let auth = middleware();
    let outcome = auth.authenticate(make_request(Method::GET, "/anything", None), false);
    assert_eq!(outcome.decision(), AuthDecision::Public);
}

#[test]
fn test_missing_header_is_rejected() {
    let auth = middleware();
    let outcome = auth.authenticate(make_request(Method::GET, "/api/expenses", None), true);
    assert_eq!(rejection_reason(outcome), TokenError::MissingToken);
}

#[test]
fn test_wrong_scheme_is_rejected() {
    let auth = middleware();
    let token = mint("alice", NOW + 60);
    for value in [format!("Token {token}"), format!("bearer {token}"), "Bearer ".into(), token] {
        let outcome = auth.authenticate(
            make_request(Method::GET, "/api/expenses", Some(&value)),
            true,
        );
        assert_eq!(rejection_reason(outcome), TokenError::MissingToken, "{value}");
    }
}

#[test]
fn test_each_failure_reason() {
    let auth = middleware();

    let expired = format!("Bearer {}", mint("alice", NOW - 1));
    let outcome = auth.authenticate(make_request(Method::GET, "/api/budgets", Some(&expired)), true);
    assert_eq!(rejection_reason(outcome), TokenError::Expired);

    let forged = encode(
        &Header::default(),
        &json!({"sub": "alice", "exp": NOW + 60}),
        &EncodingKey::from_secret(b"not-the-gateway-secret-but-long-enough"),
    )
    .unwrap();
    let forged = format!("Bearer {forged}");
    let outcome = auth.authenticate(make_request(Method::GET, "/api/budgets", Some(&forged)), true);
    assert_eq!(rejection_reason(outcome), TokenError::InvalidSignature);

    let outcome = auth.authenticate(
        make_request(Method::GET, "/api/budgets", Some("Bearer abc.def")),
        true,
    );
    assert_eq!(rejection_reason(outcome), TokenError::Malformed);
}

#[test]
fn test_valid_token_injects_subject() {
    let auth = middleware();
    let bearer = format!("Bearer {}", mint("user@example.com", NOW + 3600));
    let outcome = auth.authenticate(
        make_request(Method::POST, "/api/expenses", Some(&bearer)),
        true,
    );

    let Outcome::Forwarded(fwd) = outcome else {
        panic!("expected forwarded");
    };
    assert_eq!(fwd.subject().map(|s| s.as_str()), Some("user@example.com"));

    let request = fwd.into_request();
    assert_eq!(*request.method(), Method::POST);
    assert_eq!(request.uri().path(), "/api/expenses");
    assert_eq!(
        request.headers().get(&IDENTITY_HEADER),
        Some(&HeaderValue::from_static("user@example.com"))
    );
    assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), bearer.as_str());
    assert_eq!(request.body(), &Bytes::from_static(b"{\"amount\":12.5}"));
}

#[test]
fn test_spoofed_identity_never_survives() {
    let auth = middleware();
    let bearer = format!("Bearer {}", mint("alice", NOW + 60));

    let mut protected = make_request(Method::GET, "/api/users/me", Some(&bearer));
    protected
        .headers_mut()
        .append("x-user-name", HeaderValue::from_static("admin"));
    let Outcome::Forwarded(fwd) = auth.authenticate(protected, true) else {
        panic!("expected forwarded");
    };
    let values: Vec<_> = fwd
        .request()
        .headers()
        .get_all(&IDENTITY_HEADER)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(values, ["alice"]);

    let mut rejected = make_request(Method::GET, "/api/users/me", None);
    rejected
        .headers_mut()
        .append("x-user-name", HeaderValue::from_static("admin"));
    assert_eq!(
        rejection_reason(auth.authenticate(rejected, true)),
        TokenError::MissingToken
    );
}

#[test]
fn test_leeway_is_honoured() {
    let validator = TokenValidator::new(SECRET)
        .with_clock(FixedClock::from_timestamp(NOW))
        .with_leeway(Duration::from_secs(30));
    let auth = AuthenticationMiddleware::new(validator).with_classifier(PathClassifier::new());

    let bearer = format!("Bearer {}", mint("alice", NOW - 20));
    let outcome = auth.authenticate(make_request(Method::GET, "/api/expenses", Some(&bearer)), true);
    assert!(matches!(outcome, Outcome::Forwarded(_)));
}

#[test]
fn test_same_input_same_decision() {
    let auth = middleware();
    let bearer = format!("Bearer {}", mint("erin", NOW + 5));
    let first = auth
        .authenticate(make_request(Method::GET, "/api/expenses", Some(&bearer)), true)
        .decision();
    for _ in 0..5 {
        let again = auth
            .authenticate(make_request(Method::GET, "/api/expenses", Some(&bearer)), true)
            .decision();
        assert_eq!(again, first);
    }
}
