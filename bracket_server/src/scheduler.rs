//! Periodic round closure.
//!
//! Every sweep tries to close the latest round of each active tournament
//! without forcing, so a round only advances once its window has elapsed.

use bracket_engine::{BracketEngine, RoundOutcome};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::{locks::TournamentLocks, logging, metrics};

/// Tally of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub advanced: usize,
    pub completed: usize,
    pub not_ready: usize,
    /// Tournaments held by another caller during the sweep
    pub busy: usize,
    pub failed: usize,
}

/// Background task closing rounds whose window has elapsed
pub struct RoundScheduler {
    engine: BracketEngine,
    locks: TournamentLocks,
    period: Duration,
}

impl RoundScheduler {
    pub fn new(engine: BracketEngine, locks: TournamentLocks, period: Duration) -> Self {
        Self {
            engine,
            locks,
            period,
        }
    }

    /// Close every active tournament's ready round once
    pub async fn sweep(&self) -> SweepReport {
        metrics::scheduler_runs_total();
        let mut report = SweepReport::default();

        let tournaments = match self.engine.store().list_active_tournaments().await {
            Ok(tournaments) => tournaments,
            Err(e) => {
                tracing::error!("Scheduler could not list active tournaments: {}", e);
                metrics::scheduler_failures_total();
                report.failed += 1;
                return report;
            }
        };
        metrics::active_tournaments(tournaments.len());

        for tournament_id in tournaments {
            report.checked += 1;

            let Some(_guard) = self.locks.try_acquire(tournament_id).await else {
                tracing::debug!("Tournament {} busy, skipping this sweep", tournament_id);
                report.busy += 1;
                continue;
            };

            let started = Instant::now();
            match self
                .engine
                .close_round_and_advance(tournament_id, None, false)
                .await
            {
                Ok(outcome) => {
                    let round = match &outcome {
                        RoundOutcome::NotReady { round, .. } => {
                            report.not_ready += 1;
                            *round
                        }
                        RoundOutcome::Advanced { round, .. } => {
                            report.advanced += 1;
                            *round
                        }
                        RoundOutcome::Completed { round, .. } => {
                            report.completed += 1;
                            *round
                        }
                    };
                    if !matches!(outcome, RoundOutcome::NotReady { .. }) {
                        metrics::record_round_outcome(&outcome);
                        logging::log_round_outcome(
                            tournament_id,
                            round,
                            outcome.label(),
                            "scheduler",
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Scheduler failed to close round for tournament {}: {}",
                        tournament_id,
                        e
                    );
                    metrics::scheduler_failures_total();
                    report.failed += 1;
                }
            }
            logging::log_performance(
                "scheduled_round_close",
                started.elapsed().as_millis() as u64,
                Some(tournament_id),
            );
        }

        report
    }

    /// Sweep on every tick until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Round scheduler started, sweeping every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    tracing::debug!("Scheduler sweep finished: {:?}", report);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Round scheduler stopped");
    }
}
