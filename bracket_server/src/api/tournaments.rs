//! Tournament bracket API handlers.
//!
//! Generating matches and closing rounds both mutate the bracket, so they run
//! under the tournament's lock. Round status is a plain read.
//!
//! # Examples
//!
//! Generate round 1:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/tournaments/1/matches \
//!   -H "Content-Type: application/json" -d '{}'
//! ```
//!
//! Close the latest round even if its window is still open:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/tournaments/1/rounds/close \
//!   -H "Content-Type: application/json" -d '{"force": true}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
};
use bracket_engine::RoundOutcome;
use bracket_engine::bracket::{
    Battle, BattleId, GeneratedMatches, QualifierFallback, RoundSchedule, RoundStatus,
    TournamentId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{ApiError, AppState, api_error, request_id::RequestId};
use crate::{logging, metrics};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateMatchesRequest {
    /// Entrants in entry order; registered participants when absent
    pub participants: Option<Vec<UserId>>,
    /// Round to pair, 1 when absent
    pub round: Option<u32>,
    /// Start time of the round's battles, now when absent
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseRoundRequest {
    /// Round to close, the latest one when absent
    pub round: Option<u32>,
    /// Close before the round's window has elapsed
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct BattleSummary {
    pub id: BattleId,
    pub round: u32,
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<&Battle> for BattleSummary {
    fn from(battle: &Battle) -> Self {
        Self {
            id: battle.id,
            round: battle.round,
            player1_id: battle.player1_id,
            player2_id: battle.player2_id,
            status: battle.status.to_string(),
            scheduled_at: battle.scheduled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub round: u32,
    pub battles: Vec<BattleSummary>,
    pub created: Vec<BattleId>,
    pub bye: Option<UserId>,
    pub warnings: Vec<String>,
}

impl From<RoundSchedule> for ScheduleResponse {
    fn from(schedule: RoundSchedule) -> Self {
        Self {
            round: schedule.round,
            battles: schedule.battles.iter().map(BattleSummary::from).collect(),
            created: schedule.created,
            bye: schedule.bye,
            warnings: schedule.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub selected: Vec<UserId>,
    pub excluded: Vec<UserId>,
    /// `no_attempts` or `storage_error` when entrants were not ranked
    pub fallback: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct GenerateMatchesResponse {
    pub tournament_id: TournamentId,
    pub round: u32,
    pub bracket_slots: Option<u32>,
    pub selection: Option<SelectionResponse>,
    pub schedule: ScheduleResponse,
}

impl From<GeneratedMatches> for GenerateMatchesResponse {
    fn from(generated: GeneratedMatches) -> Self {
        Self {
            tournament_id: generated.tournament_id,
            round: generated.round,
            bracket_slots: generated.bracket_slots,
            selection: generated.selection.map(|selection| SelectionResponse {
                fallback: selection.fallback.as_ref().map(|f| match f {
                    QualifierFallback::NoAttempts => "no_attempts",
                    QualifierFallback::StorageError(_) => "storage_error",
                }),
                selected: selection.selected,
                excluded: selection.excluded,
            }),
            schedule: generated.schedule.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcomeResponse {
    NotReady {
        round: u32,
        ready_at: DateTime<Utc>,
    },
    Advanced {
        round: u32,
        winners: Vec<UserId>,
        next_round: u32,
        schedule: ScheduleResponse,
    },
    Completed {
        round: u32,
        winner_id: UserId,
    },
}

impl From<RoundOutcome> for RoundOutcomeResponse {
    fn from(outcome: RoundOutcome) -> Self {
        match outcome {
            RoundOutcome::NotReady { round, ready_at } => Self::NotReady { round, ready_at },
            RoundOutcome::Advanced {
                round,
                winners,
                next_round,
                schedule,
            } => Self::Advanced {
                round,
                winners,
                next_round,
                schedule: schedule.into(),
            },
            RoundOutcome::Completed { round, winner_id } => Self::Completed { round, winner_id },
        }
    }
}

/// Generate a round's battles.
///
/// # Request Body
///
/// ```json
/// { "participants": null, "round": 1, "scheduled_at": null }
/// ```
///
/// Every field is optional.
///
/// # Errors
///
/// - `400 Bad Request`: Fewer than two participants, invalid round or bracket size
/// - `404 Not Found`: Tournament doesn't exist
/// - `409 Conflict`: Tournament already completed
pub async fn generate_matches(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<GenerateMatchesRequest>,
) -> Result<Json<GenerateMatchesResponse>, ApiError> {
    let round = request.round.unwrap_or(1);
    let _guard = state.locks.acquire(tournament_id).await;

    let started = Instant::now();
    let generated = state
        .engine
        .generate_matches(
            tournament_id,
            request.participants.as_deref(),
            round,
            request.scheduled_at,
        )
        .await
        .map_err(api_error)?;
    logging::log_performance(
        "generate_matches",
        started.elapsed().as_millis() as u64,
        Some(tournament_id),
    );

    metrics::battles_created_total(generated.schedule.created.len());
    tracing::info!(
        request_id = %request_id.as_str(),
        "Generated {} battle(s) for tournament {} round {}",
        generated.schedule.battles.len(),
        tournament_id,
        round
    );

    Ok(Json(generated.into()))
}

/// Close a round and advance its winners.
///
/// # Request Body
///
/// ```json
/// { "round": null, "force": false }
/// ```
///
/// # Response
///
/// `200 OK` with the outcome, tagged by `outcome`: `not_ready` (window still
/// open), `advanced` (next round scheduled) or `completed` (champion decided).
///
/// # Errors
///
/// - `400 Bad Request`: No battles for the round
/// - `404 Not Found`: Tournament doesn't exist
/// - `422 Unprocessable Entity`: Round produced no winners
pub async fn close_round(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<CloseRoundRequest>,
) -> Result<Json<RoundOutcomeResponse>, ApiError> {
    let _guard = state.locks.acquire(tournament_id).await;

    let started = Instant::now();
    let outcome = state
        .engine
        .close_round_and_advance(tournament_id, request.round, request.force)
        .await
        .map_err(api_error)?;
    logging::log_performance(
        "close_round",
        started.elapsed().as_millis() as u64,
        Some(tournament_id),
    );

    let round = match &outcome {
        RoundOutcome::NotReady { round, .. }
        | RoundOutcome::Advanced { round, .. }
        | RoundOutcome::Completed { round, .. } => *round,
    };
    metrics::record_round_outcome(&outcome);
    logging::log_round_outcome(
        tournament_id,
        round,
        outcome.label(),
        &format!("http:{}", request_id.as_str()),
    );

    Ok(Json(outcome.into()))
}

/// Progress of a round.
///
/// ```json
/// {
///   "round": 1, "total": 2, "completed": 1, "pending": 1,
///   "is_complete": false, "battle_ids": [1, 2]
/// }
/// ```
pub async fn round_status(
    State(state): State<AppState>,
    Path((tournament_id, round)): Path<(TournamentId, u32)>,
) -> Result<Json<RoundStatus>, ApiError> {
    state
        .engine
        .round_status(tournament_id, round)
        .await
        .map(Json)
        .map_err(api_error)
}
