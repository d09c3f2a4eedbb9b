//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, upstream failures, connections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_requests_total` (counter): client responses by status
//! - `proxy_request_duration_seconds` (histogram): accept to last byte
//! - `proxy_upstream_failures_total` (counter): failures by backend, reason
//! - `proxy_backend_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `proxy_active_connections` (gauge): in-flight client connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder (metrics disabled, tests) every call is a no-op
//! - Labels are low-cardinality: status code, backend name, reason token

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::StartupError;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), StartupError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// A response was written to a client.
pub fn record_request(status: u16, elapsed: Duration) {
    metrics::counter!("proxy_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(elapsed.as_secs_f64());
}

/// A backend attempt failed.
pub fn record_upstream_failure(backend: &str, reason: &'static str) {
    metrics::counter!(
        "proxy_upstream_failures_total",
        "backend" => backend.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn set_backend_healthy(backend: &str, healthy: bool) {
    metrics::gauge!("proxy_backend_healthy", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}
