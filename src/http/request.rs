//! Request identification and header preparation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) as early as possible
//! - Echo the ID back to the client and forward it to the backend
//! - Strip connection-management headers before forwarding
//!
//! # Design Decisions
//! - An ID supplied by the client is kept, not replaced
//! - The backend's transport computes its own framing headers

use axum::http::{header, HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers never forwarded to the backend.
///
/// `host`, `connection` and `content-length` identify or frame the inbound
/// hop; the rest are the remaining hop-by-hop headers.
pub const STRIPPED_HEADERS: [&str; 9] = [
    "host",
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Layer assigning an ID to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer copying the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Extract the request ID, if present.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Copy `source` minus stripped headers.
pub fn forwardable_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if is_stripped(name) || is_listed_in_connection(source, name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_stripped(name: &HeaderName) -> bool {
    STRIPPED_HEADERS.contains(&name.as_str())
}

/// Headers named by `Connection` are hop-by-hop as well.
fn is_listed_in_connection(headers: &HeaderMap, name: &HeaderName) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case(name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_connection_management_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.com"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-hop"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4"));
        headers.insert("x-hop", HeaderValue::from_static("1"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append("x-multi", HeaderValue::from_static("a"));
        headers.append("x-multi", HeaderValue::from_static("b"));
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));

        let forwarded = forwardable_headers(&headers);
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get(header::CONTENT_LENGTH).is_none());
        assert!(forwarded.get("x-hop").is_none());
        assert_eq!(forwarded.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(forwarded.get_all("x-multi").iter().count(), 2);
        assert_eq!(request_id(&forwarded), "abc");
    }

    #[test]
    fn missing_request_id_reads_as_unknown() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
