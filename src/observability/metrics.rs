//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status
//! - `gateway_request_duration_seconds` (histogram): proxy latency
//! - `gateway_bridge_sessions_active` (gauge): live WebSocket bridge sessions
//! - `gateway_downloads_total` (counter): download outcomes by status
//! - `gateway_backend_ready` (gauge): 1=ready, 0=not ready
//!
//! Without an installed recorder every call is a no-op, so tests never need
//! to set one up.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn bridge_session_opened() {
    ::metrics::gauge!("gateway_bridge_sessions_active").increment(1.0);
}

pub fn bridge_session_closed() {
    ::metrics::gauge!("gateway_bridge_sessions_active").decrement(1.0);
}

pub fn record_download(status: &'static str) {
    ::metrics::counter!("gateway_downloads_total", "status" => status).increment(1);
}

pub fn record_backend_ready(ready: bool) {
    ::metrics::gauge!("gateway_backend_ready").set(if ready { 1.0 } else { 0.0 });
}
