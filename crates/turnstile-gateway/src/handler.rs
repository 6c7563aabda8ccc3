//! Per-request pipeline.
//!
//! ```text
//! request ─► resolve route ─► authenticate ─► read body ─► forward ─► response
//!                 │                 │              │           │
//!                404               401         413 / 400   502 / 504
//! ```
//!
//! The route is resolved first so the middleware knows whether the target
//! demands a token. Nothing is sent upstream unless authentication ends in
//! `Forwarded`.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::{debug, error, info, info_span, warn, Instrument};
use turnstile_auth::{AuthenticationMiddleware, Outcome};
use turnstile_router::RouteTable;
use turnstile_telemetry::{
    record_auth_rejection, record_request, record_upstream_error, InFlightGuard, UNMATCHED_ROUTE,
};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::forwarder::{upstream_error_kind, RequestForwarder};
use crate::headers::{downstream_response_headers, HEADER_REQUEST_ID};

/// Longest inbound request ID the gateway will adopt.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Response body type produced by the gateway.
pub type GatewayBody = Full<Bytes>;

/// Routes, authenticates and forwards requests.
///
/// Cheap to share behind an `Arc`; it holds no per-request state.
#[derive(Debug, Clone)]
pub struct Gateway {
    routes: RouteTable,
    auth: AuthenticationMiddleware,
    forwarder: RequestForwarder,
    max_body: usize,
}

impl Gateway {
    /// Assemble a gateway from its parts.
    pub fn new(
        routes: RouteTable,
        auth: AuthenticationMiddleware,
        forwarder: RequestForwarder,
        max_body: usize,
    ) -> Self {
        Self {
            routes,
            auth,
            forwarder,
            max_body,
        }
    }

    /// Build a gateway from validated configuration.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Ok(Self::new(
            config.route_table()?,
            AuthenticationMiddleware::new(config.token_validator()),
            RequestForwarder::new(config.server.upstream_timeout)?
                .with_max_response_body(config.server.max_response_body_size),
            config.server.max_request_body_size,
        ))
    }

    /// The route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request end to end. Never fails: every error becomes a
    /// JSON error response.
    pub async fn handle<B>(&self, req: Request<B>, peer: Option<IpAddr>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = request_id(&req);
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let _in_flight = InFlightGuard::new();
            let (route_label, result) = self.dispatch(req, peer).await;

            let mut response = match result {
                Ok(response) => response,
                Err(err) => error_response(&err, &request_id),
            };
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(HEADER_REQUEST_ID.clone(), value);
            }

            let duration = start.elapsed();
            record_request(&route_label, response.status().as_u16(), duration);
            info!(
                route = %route_label,
                status = response.status().as_u16(),
                duration_ms = millis(duration),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    /// Runs the pipeline, returning the metric route label with the result.
    async fn dispatch<B>(
        &self,
        req: Request<B>,
        peer: Option<IpAddr>,
    ) -> (String, GatewayResult<Response<GatewayBody>>)
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();
        let Some(route) = self.routes.resolve(&path) else {
            debug!(%path, "no route matched");
            return (UNMATCHED_ROUTE.to_string(), Err(GatewayError::unroutable(path)));
        };
        let label = route.name().to_string();

        let forwarded = match self.auth.authenticate(req, route.requires_auth()) {
            Outcome::Forwarded(forwarded) => forwarded,
            Outcome::Terminated(rejection) => {
                record_auth_rejection(rejection.reason().reason());
                return (label, Err(GatewayError::from(rejection.reason())));
            }
        };

        if let Some(declared) = declared_length(forwarded.request().headers()) {
            if declared > self.max_body as u64 {
                warn!(declared, limit = self.max_body, "request body too large");
                return (label, Err(GatewayError::PayloadTooLarge { limit: self.max_body }));
            }
        }

        let (head, body) = forwarded.take_body();
        let body = match read_body(body, self.max_body).await {
            Ok(body) => body,
            Err(err) => return (label, Err(err)),
        };

        match self.forwarder.forward(route, head.with_body(body), peer).await {
            Ok(upstream) => {
                if upstream.is_server_error() {
                    warn!(
                        route = %label,
                        status = upstream.status.as_u16(),
                        "upstream server error"
                    );
                }
                let mut response = Response::new(Full::new(upstream.body));
                *response.status_mut() = upstream.status;
                *response.headers_mut() = downstream_response_headers(&upstream.headers);
                (label, Ok(response))
            }
            Err(err) => {
                if let Some(kind) = upstream_error_kind(&err) {
                    record_upstream_error(&label, kind);
                }
                error!(route = %label, error = %err, "forwarding failed");
                (label, Err(err))
            }
        }
    }
}

/// The inbound `X-Request-ID` if usable, otherwise a fresh UUID v7.
fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(&HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_valid_request_id(id))
        .map_or_else(|| Uuid::now_v7().to_string(), ToString::to_string)
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

fn declared_length(headers: &http::HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn read_body<B>(body: B, limit: usize) -> GatewayResult<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit, "request body too large");
            Err(GatewayError::PayloadTooLarge { limit })
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            Err(GatewayError::bad_request(format!("failed to read request body: {e}")))
        }
    }
}

/// Create a JSON response.
pub fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<GatewayBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Create an error response. Only the client-safe message is included.
pub fn error_response(err: &GatewayError, request_id: &str) -> Response<GatewayBody> {
    let body = ErrorResponse::from(err).with_request_id(request_id);
    json_response(err.status_code(), &body)
}
