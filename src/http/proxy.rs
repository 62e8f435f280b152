//! Reverse proxy to the supervised backend.
//!
//! # Responsibilities
//! - Rebuild each inbound request against the backend's loopback address
//! - Forward method, path, query and body bytes unchanged
//! - Relay status, headers and body back verbatim
//!
//! # Design Decisions
//! - Byte-transparent: payloads are never inspected
//! - Empty inbound bodies are forwarded as no body
//! - No retries; upstream failure is a single 502/504 response

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::request::{forwardable_headers, request_id, X_REQUEST_ID};
use crate::observability::metrics;

/// Content type used when the backend does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Forwards requests to one backend address.
#[derive(Clone)]
pub struct ReverseProxy {
    client: Client<HttpConnector, Body>,
    backend: SocketAddr,
    timeout: Duration,
    max_body_size: usize,
}

impl ReverseProxy {
    pub fn new(backend: SocketAddr, timeout: Duration, max_body_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            backend,
            timeout,
            max_body_size,
        }
    }

    pub fn backend(&self) -> SocketAddr {
        self.backend
    }

    /// Build the backend URI for an inbound URI (path and query kept).
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = match uri.path() {
            "" => "/",
            path => path,
        };
        let path_and_query = match uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };
        Uri::builder()
            .scheme("http")
            .authority(self.backend.to_string().as_str())
            .path_and_query(path_and_query.as_str())
            .build()
    }

    /// Forward one request and relay the backend's response.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let start_time = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let request_id = request_id(&parts.headers).to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            uri = %parts.uri,
            "Proxying request"
        );

        let body_bytes = match axum::body::to_bytes(body, self.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) if exceeds_limit(&e) => {
                tracing::warn!(request_id = %request_id, limit = self.max_body_size, "Request body too large");
                metrics::record_request(method.as_str(), 413, start_time);
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
                metrics::record_request(method.as_str(), 400, start_time);
                return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
            }
        };

        let uri = match self.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Invalid upstream URI");
                metrics::record_request(method.as_str(), 400, start_time);
                return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
            }
        };

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .version(axum::http::Version::HTTP_11);
        if let Some(headers) = builder.headers_mut() {
            *headers = forwardable_headers(&parts.headers);
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                headers.insert(X_REQUEST_ID, value);
            }
        }

        let outbound = match builder.body(if body_bytes.is_empty() {
            Body::empty()
        } else {
            Body::from(body_bytes)
        }) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to build upstream request");
                metrics::record_request(method.as_str(), 400, start_time);
                return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
            }
        };

        match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => {
                let response: hyper::Response<hyper::body::Incoming> = response;
                let status = response.status();
                metrics::record_request(method.as_str(), status.as_u16(), start_time);

                let (mut parts, body) = response.into_parts();
                if !parts.headers.contains_key(header::CONTENT_TYPE) {
                    parts
                        .headers
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
                }
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, backend = %self.backend, error = %e, "Upstream error");
                metrics::record_request(method.as_str(), 502, start_time);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
            Err(_) => {
                tracing::error!(
                    request_id = %request_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Upstream request timed out"
                );
                metrics::record_request(method.as_str(), 504, start_time);
                (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
            }
        }
    }
}

/// Whether a body error came from a length limit, here or in the middleware.
fn exceeds_limit(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
