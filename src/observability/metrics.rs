//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by verb, status
//! - `gateway_request_duration_seconds` (histogram): time to first response byte
//! - `gateway_sessions_active` (gauge): registry size
//! - `gateway_sessions_created_total` (counter)
//! - `gateway_sessions_closed_total` (counter): by reason (terminate, idle, shutdown)
//! - `gateway_auth_rejections_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(verb: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "verb" => verb.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "verb" => verb.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_sessions(count: usize) {
    gauge!("gateway_sessions_active").set(count as f64);
}

pub fn record_session_created() {
    counter!("gateway_sessions_created_total").increment(1);
}

pub fn record_session_closed(reason: &'static str) {
    counter!("gateway_sessions_closed_total", "reason" => reason).increment(1);
}

pub fn record_auth_rejection() {
    counter!("gateway_auth_rejections_total").increment(1);
}
