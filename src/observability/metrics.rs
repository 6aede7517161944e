//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests entering the check chain
//! - `gate_rejections_total` (counter): rejections by reason
//! - `audit_events_total` (counter): appended entries by kind
//! - `audit_write_failures_total` (counter): failed audit persists
//! - `security_alerts_total` (counter): alerts by severity
//! - `gate_table_size` (gauge): rate-limit / CSRF / session table sizes

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_gate_request() {
    ::metrics::counter!("gate_requests_total").increment(1);
}

pub fn record_gate_rejection(reason: &'static str) {
    ::metrics::counter!("gate_rejections_total", "reason" => reason).increment(1);
}

pub fn record_audit_event(kind: &'static str) {
    ::metrics::counter!("audit_events_total", "kind" => kind).increment(1);
}

pub fn record_audit_write_failure() {
    ::metrics::counter!("audit_write_failures_total").increment(1);
}

pub fn record_security_alert(severity: &'static str) {
    ::metrics::counter!("security_alerts_total", "severity" => severity).increment(1);
}

pub fn record_table_size(table: &'static str, size: usize) {
    ::metrics::gauge!("gate_table_size", "table" => table).set(size as f64);
}
