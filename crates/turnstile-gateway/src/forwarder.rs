//! Upstream HTTP client.
//!
//! The forwarder relays an already-authenticated request to its route's
//! upstream and buffers the answer, up to a size cap. It never retries and
//! never follows redirects; a 3xx from upstream goes back to the client as-is.

use std::net::IpAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use reqwest::{redirect, Client};
use tracing::{debug, warn};
use turnstile_auth::ForwardedRequest;
use turnstile_router::Route;

use crate::error::{GatewayError, GatewayResult};
use crate::headers::upstream_request_headers;

/// Metric label for transport failures.
pub const KIND_UNAVAILABLE: &str = "unavailable";

/// Metric label for deadline expiry.
pub const KIND_TIMEOUT: &str = "timeout";

/// Default cap on a buffered upstream response body (64MB).
pub const DEFAULT_MAX_RESPONSE_BODY: usize = 64 * 1024 * 1024;

/// Relays requests to upstream services over a pooled client.
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    client: Client,
    timeout: Duration,
    max_response_body: usize,
}

impl RequestForwarder {
    /// Create a forwarder whose calls are bounded by `timeout`.
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .redirect(redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::server(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            max_response_body: DEFAULT_MAX_RESPONSE_BODY,
        })
    }

    /// Cap the buffered upstream response body at `bytes`.
    #[must_use]
    pub fn with_max_response_body(mut self, bytes: usize) -> Self {
        self.max_response_body = bytes;
        self
    }

    /// Upstream deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest upstream response body that will be relayed.
    pub fn max_response_body(&self) -> usize {
        self.max_response_body
    }

    /// Send `request` to the upstream of `route`.
    ///
    /// Status, headers and body of the upstream response are returned
    /// untouched; the caller decides what reaches the client.
    pub async fn forward(
        &self,
        route: &Route,
        request: ForwardedRequest<Bytes>,
        peer: Option<IpAddr>,
    ) -> GatewayResult<UpstreamResponse> {
        let request = request.into_request();
        let target = route
            .upstream_uri(request.uri().path(), request.uri().query())
            .map_err(|e| GatewayError::bad_request(e.to_string()))?;
        let headers = upstream_request_headers(request.headers(), peer);
        let method = request.method().clone();
        let body = request.into_body();

        debug!(route = %route.name(), %method, upstream = %target, "forwarding request");

        let mut builder = self
            .client
            .request(method, target.to_string())
            .headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify(route, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = self.read_response_body(route, response).await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    /// Buffers the upstream body, failing once it outgrows the cap.
    async fn read_response_body(
        &self,
        route: &Route,
        mut response: reqwest::Response,
    ) -> GatewayResult<Bytes> {
        let limit = self.max_response_body;
        let too_large = || {
            warn!(route = %route.name(), limit, "upstream response body too large");
            GatewayError::upstream_unavailable(
                route.name(),
                format!("response body exceeds {limit} bytes"),
            )
        };

        if response
            .content_length()
            .is_some_and(|declared| declared > limit as u64)
        {
            return Err(too_large());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify(route, &e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    fn classify(&self, route: &Route, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::upstream_timeout(route.name(), self.timeout)
        } else {
            GatewayError::upstream_unavailable(route.name(), err.to_string())
        }
    }
}

/// Buffered upstream response.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers, hop-by-hop ones included.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Check if the upstream reported a server error.
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}

/// Metric label for a forwarding error, if it is an upstream failure.
pub fn upstream_error_kind(err: &GatewayError) -> Option<&'static str> {
    match err {
        GatewayError::UpstreamUnavailable { .. } => Some(KIND_UNAVAILABLE),
        GatewayError::UpstreamTimeout { .. } => Some(KIND_TIMEOUT),
        _ => None,
    }
}
