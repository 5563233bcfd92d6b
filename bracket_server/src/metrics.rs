//! Prometheus metrics for the bracket server.
//!
//! Metrics are exposed in Prometheus text format for scraping by monitoring systems.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration per route
//! - **Bracket Metrics**: Rounds closed, battles created, tournaments completed
//! - **Scheduler Metrics**: Sweeps and per-tournament failures
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bracket_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::rounds_closed_total("advanced");
//! ```

use bracket_engine::RoundOutcome;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Bracket Metrics
// ============================================================================

/// Increment rounds closed counter, labelled by outcome.
pub fn rounds_closed_total(outcome: &str) {
    metrics::counter!("rounds_closed_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Add newly created battles.
pub fn battles_created_total(count: usize) {
    metrics::counter!("battles_created_total").increment(count as u64);
}

/// Increment tournaments completed counter.
pub fn tournaments_completed_total() {
    metrics::counter!("tournaments_completed_total").increment(1);
}

/// Record everything a round closure produced.
pub fn record_round_outcome(outcome: &RoundOutcome) {
    rounds_closed_total(outcome.label());
    match outcome {
        RoundOutcome::Advanced { schedule, .. } => battles_created_total(schedule.created.len()),
        RoundOutcome::Completed { .. } => tournaments_completed_total(),
        RoundOutcome::NotReady { .. } => {}
    }
}

// ============================================================================
// Scheduler Metrics
// ============================================================================

/// Increment scheduler sweep counter.
pub fn scheduler_runs_total() {
    metrics::counter!("scheduler_runs_total").increment(1);
}

/// Increment per-tournament scheduler failures.
pub fn scheduler_failures_total() {
    metrics::counter!("scheduler_failures_total").increment(1);
}

/// Set the number of active tournaments seen by the last sweep.
pub fn active_tournaments(count: usize) {
    metrics::gauge!("active_tournaments").set(count as f64);
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Increment domain events relayed, labelled by event type.
pub fn domain_events_total(kind: &str) {
    metrics::counter!("domain_events_total",
        "type" => kind.to_string()
    )
    .increment(1);
}
