//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; `init` installs a tracing
//! subscriber that also captures those records, so engine and server output
//! share one filter and format.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use bracket_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log the result of closing a round
pub fn log_round_outcome(tournament_id: i64, round: u32, outcome: &str, trigger: &str) {
    tracing::info!(
        tournament_id = tournament_id,
        round = round,
        outcome = outcome,
        trigger = trigger,
        "Round close finished"
    );
}

/// Log a slow engine operation
pub fn log_performance(operation: &str, duration_ms: u64, tournament_id: Option<i64>) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            tournament_id = tournament_id,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            tournament_id = tournament_id,
            "Performance metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_sqlx() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(DEFAULT_FILTER.contains("sqlx=warn"));
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        log_round_outcome(1, 2, "advanced", "scheduler");
        log_performance("close_round", 20, Some(1));
        log_performance("close_round", 2000, None);
    }
}
