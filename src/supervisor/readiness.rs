//! Readiness probing.
//!
//! # Responsibilities
//! - Probe the backend's readiness endpoint over HTTP
//! - Classify each probe as ready / not ready with a reason for logging

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

/// Result of one readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Ready,
    NotReady(String),
}

/// HTTP prober for a single backend address.
#[derive(Clone)]
pub struct ReadinessProbe {
    client: Client<HttpConnector, Body>,
    uri: String,
    timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(addr: SocketAddr, path: &str, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            uri: format!("http://{}{}", addr, path),
            timeout,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Issue one probe.
    pub async fn probe(&self) -> ProbeResult {
        let request = match Request::builder()
            .method("GET")
            .uri(&self.uri)
            .header("user-agent", "supervised-gateway-readiness")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return ProbeResult::NotReady(format!("invalid probe request: {}", e)),
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => ProbeResult::Ready,
            Ok(Ok(response)) => ProbeResult::NotReady(format!("status {}", response.status())),
            Ok(Err(e)) => ProbeResult::NotReady(format!("connection error: {}", e)),
            Err(_) => ProbeResult::NotReady("timeout".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    #[tokio::test]
    async fn success_status_is_ready() {
        let addr = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        let probe = ReadinessProbe::new(addr, "/", Duration::from_secs(1));
        assert_eq!(probe.probe().await, ProbeResult::Ready);
    }

    #[tokio::test]
    async fn error_status_is_not_ready() {
        let addr = serve(Router::new().route(
            "/",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let probe = ReadinessProbe::new(addr, "/", Duration::from_secs(1));
        assert!(matches!(probe.probe().await, ProbeResult::NotReady(reason) if reason.contains("503")));
    }

    #[tokio::test]
    async fn closed_port_is_not_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ReadinessProbe::new(addr, "/", Duration::from_secs(1));
        assert!(matches!(probe.probe().await, ProbeResult::NotReady(_)));
    }
}
