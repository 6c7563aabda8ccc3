//! Header handling between client, gateway and upstream.
//!
//! Only hop-by-hop headers are dropped. Everything end-to-end, including
//! `Authorization`, passes through so upstream services can re-validate the
//! token on their own.

use std::net::IpAddr;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Header carrying the gateway's request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Client address chain.
pub static HEADER_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Original scheme.
pub static HEADER_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Original `Host`.
pub static HEADER_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Connection-scoped headers that never cross a proxy (RFC 9110 §7.6.1).
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop.
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Header names listed in `Connection`, which are hop-by-hop for this message.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

fn copy_end_to_end(source: &HeaderMap, skip: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let listed = connection_listed(source);
    let mut out = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if is_hop_by_hop_header(name) || listed.contains(name) || skip(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers for the upstream request.
///
/// Drops hop-by-hop headers, `Host` (the client sets it from the upstream URL)
/// and `Content-Length` (recomputed from the buffered body), then appends the
/// `X-Forwarded-*` set.
pub fn upstream_request_headers(inbound: &HeaderMap, peer: Option<IpAddr>) -> HeaderMap {
    let mut out = copy_end_to_end(inbound, |name| {
        *name == header::HOST || *name == header::CONTENT_LENGTH
    });

    if let Some(ip) = peer {
        let chain = match inbound
            .get(&HEADER_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            out.insert(HEADER_FORWARDED_FOR.clone(), value);
        }
    }

    if !out.contains_key(&HEADER_FORWARDED_PROTO) {
        out.insert(HEADER_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
    }

    if let Some(host) = inbound.get(header::HOST) {
        if !out.contains_key(&HEADER_FORWARDED_HOST) {
            out.insert(HEADER_FORWARDED_HOST.clone(), host.clone());
        }
    }

    out
}

/// Headers for the client response: the upstream's, minus hop-by-hop ones.
pub fn downstream_response_headers(upstream: &HeaderMap) -> HeaderMap {
    copy_end_to_end(upstream, |_| false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(k, v) in pairs {
            headers.append(k, HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_is_hop_by_hop_header() {
        assert!(is_hop_by_hop_header(&header::CONNECTION));
        assert!(is_hop_by_hop_header(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop_header(&header::UPGRADE));
        assert!(!is_hop_by_hop_header(&header::AUTHORIZATION));
        assert!(!is_hop_by_hop_header(&header::CONTENT_TYPE));
    }

    #[test]
    fn test_upstream_headers_keep_end_to_end() {
        let inbound = map(&[
            ("authorization", "Bearer abc"),
            ("content-type", "application/json"),
            ("accept", "application/json"),
            ("accept", "text/plain"),
            ("cookie", "session=1"),
        ]);
        let out = upstream_request_headers(&inbound, None);

        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(out.get(header::COOKIE).unwrap(), "session=1");
        assert_eq!(out.get_all(header::ACCEPT).iter().count(), 2);
    }

    #[test]
    fn test_upstream_headers_drop_hop_by_hop() {
        let inbound = map(&[
            ("connection", "keep-alive, x-internal-hop"),
            ("keep-alive", "timeout=5"),
            ("transfer-encoding", "chunked"),
            ("x-internal-hop", "1"),
            ("host", "gateway.local:8080"),
            ("content-length", "12"),
            ("x-custom", "kept"),
        ]);
        let out = upstream_request_headers(&inbound, None);

        for dropped in [
            "connection",
            "keep-alive",
            "transfer-encoding",
            "x-internal-hop",
            "host",
            "content-length",
        ] {
            assert!(!out.contains_key(dropped), "{dropped} forwarded");
        }
        assert_eq!(out.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_forwarded_headers() {
        let inbound = map(&[("host", "api.example.com")]);
        let out = upstream_request_headers(&inbound, Some("10.0.0.7".parse().unwrap()));
        assert_eq!(out.get(&HEADER_FORWARDED_FOR).unwrap(), "10.0.0.7");
        assert_eq!(out.get(&HEADER_FORWARDED_PROTO).unwrap(), "http");
        assert_eq!(out.get(&HEADER_FORWARDED_HOST).unwrap(), "api.example.com");
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let inbound = map(&[
            ("x-forwarded-for", "203.0.113.9"),
            ("x-forwarded-proto", "https"),
        ]);
        let out = upstream_request_headers(&inbound, Some("10.0.0.7".parse().unwrap()));
        assert_eq!(out.get(&HEADER_FORWARDED_FOR).unwrap(), "203.0.113.9, 10.0.0.7");
        assert_eq!(out.get(&HEADER_FORWARDED_PROTO).unwrap(), "https");
    }

    #[test]
    fn test_downstream_headers() {
        let upstream = map(&[
            ("content-type", "application/json"),
            ("set-cookie", "a=1"),
            ("set-cookie", "b=2"),
            ("transfer-encoding", "chunked"),
            ("connection", "close"),
        ]);
        let out = downstream_response_headers(&upstream);
        assert_eq!(out.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(!out.contains_key(header::TRANSFER_ENCODING));
        assert!(!out.contains_key(header::CONNECTION));
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }
}
