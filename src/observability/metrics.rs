//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_apply_total` (counter): apply attempts by outcome
//!   (committed, dry_run, rejected, conflict, rolled_back, persistence_error)
//! - `config_apply_duration_seconds` (histogram): validate-to-outcome latency
//! - `config_active_version` (gauge): id of the active version
//! - `config_sessions_open` (gauge): editing sessions with a candidate
//! - `config_pending_changes` (gauge): staged changes across all sessions
//! - `config_http_requests_total` (counter): REST requests by method, status

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics exporter listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
            false
        }
    }
}

pub fn record_apply(outcome: &'static str, started: Instant) {
    ::metrics::counter!("config_apply_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("config_apply_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_active_version(version: u64) {
    ::metrics::gauge!("config_active_version").set(version as f64);
}

pub fn record_sessions(open: usize, pending_changes: usize) {
    ::metrics::gauge!("config_sessions_open").set(open as f64);
    ::metrics::gauge!("config_pending_changes").set(pending_changes as f64);
}

pub fn record_request(method: &str, status: u16) {
    ::metrics::counter!(
        "config_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
