//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (connections, outcomes, rewrites, bytes, latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted connections
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_requests_total` (counter): requests by outcome
//! - `proxy_rewrites_total` (counter): body rewrites by kind
//! - `proxy_relayed_bytes_total` (counter): response bytes sent to clients
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened() {
    counter!("proxy_connections_total").increment(1);
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}

/// Record a finished request. `outcome` is one of `relayed`, `bad_request`,
/// `bad_gateway` or `aborted`.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("proxy_requests_total", "outcome" => outcome).increment(1);
    histogram!("proxy_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record a body rewrite: `budget`, `clamped` or `stripped`.
pub fn record_rewrite(kind: &'static str) {
    counter!("proxy_rewrites_total", "kind" => kind).increment(1);
}

pub fn record_relayed_bytes(bytes: u64) {
    counter!("proxy_relayed_bytes_total").increment(bytes);
}
