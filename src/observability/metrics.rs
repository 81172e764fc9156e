//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, sessions, frames, reconnects)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): plain and upgrade requests by method, status, upstream
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_ws_sessions_active` (gauge): relay sessions currently open
//! - `proxy_ws_frames_total` (counter): relayed frames by direction and kind
//! - `proxy_ws_reconnect_attempts_total` (counter): dial attempts by outcome
//! - `proxy_ws_broken_total` (counter): targets that failed the heartbeat
//!
//! # Design Decisions
//! - Macros from the `metrics` facade: no-ops until a recorder is installed
//! - Labels are low-cardinality (registration name, never the path)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, upstream: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("upstream", upstream.to_string()),
    ];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    gauge!("proxy_ws_sessions_active").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_ws_sessions_active").decrement(1.0);
}

pub fn record_frame(direction: &'static str, kind: &'static str) {
    counter!("proxy_ws_frames_total", "direction" => direction, "kind" => kind).increment(1);
}

pub fn record_reconnect_attempt(outcome: &'static str) {
    counter!("proxy_ws_reconnect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_broken() {
    counter!("proxy_ws_broken_total").increment(1);
}
