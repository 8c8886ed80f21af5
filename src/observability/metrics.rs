//! Metrics collection and exposition.
//!
//! # Metrics
//! - `supervisor_outcomes_total` (counter): supervised calls by outcome
//! - `supervisor_duration_seconds` (histogram): launch-to-resolution latency by outcome
//! - `supervisor_suppressed_writes_total` (counter): late writes discarded after finalization
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the resolution of one supervised call.
pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    counter!("supervisor_outcomes_total", "outcome" => outcome).increment(1);
    histogram!("supervisor_duration_seconds", "outcome" => outcome).record(elapsed.as_secs_f64());
}

/// Record a handler write discarded because the response was already finalized.
pub fn record_suppressed_write() {
    counter!("supervisor_suppressed_writes_total").increment(1);
}
