//! Battle lifecycle API handlers.
//!
//! Each transition takes the owning tournament's lock so it cannot interleave
//! with a round closure settling the same battles.

use axum::{
    Json,
    extract::{Path, State},
};
use bracket_engine::BracketError;
use bracket_engine::bracket::{Battle, BattleId, UserId};
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;

use super::{ApiError, AppState, api_error, request_id::RequestId};

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBattleRequest {
    /// Winner; decided from the battle's points when absent, draws included
    pub winner_id: Option<UserId>,
    #[serde(default)]
    pub is_draw: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForfeitBattleRequest {
    /// Player giving up the battle
    pub player_id: UserId,
    pub reason: Option<String>,
}

/// Lock the tournament a battle belongs to
async fn lock_battle_tournament(
    state: &AppState,
    battle_id: BattleId,
) -> Result<OwnedMutexGuard<()>, ApiError> {
    let battle = state
        .engine
        .store()
        .get_battle(battle_id)
        .await
        .map_err(|e| api_error(e.into()))?
        .ok_or_else(|| api_error(BracketError::BattleNotFound(battle_id)))?;
    Ok(state.locks.acquire(battle.tournament_id).await)
}

fn log_transition(request_id: &RequestId, action: &str, battle: &Battle) {
    tracing::info!(
        request_id = %request_id.as_str(),
        battle_id = battle.id,
        tournament_id = battle.tournament_id,
        status = %battle.status,
        "Battle {}",
        action
    );
}

/// Start a scheduled battle.
///
/// # Errors
///
/// - `404 Not Found`: Battle doesn't exist
/// - `409 Conflict`: Battle not scheduled or its start time not reached
pub async fn start_battle(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(battle_id): Path<BattleId>,
) -> Result<Json<Battle>, ApiError> {
    let _guard = lock_battle_tournament(&state, battle_id).await?;
    let battle = state
        .engine
        .start_battle(battle_id)
        .await
        .map_err(api_error)?;
    log_transition(&request_id, "started", &battle);
    Ok(Json(battle))
}

/// Complete a battle.
///
/// # Request Body
///
/// ```json
/// { "winner_id": 7, "is_draw": false }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Winner is not one of the players
/// - `404 Not Found`: Battle doesn't exist
/// - `409 Conflict`: Battle already finished
pub async fn complete_battle(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(battle_id): Path<BattleId>,
    Json(request): Json<CompleteBattleRequest>,
) -> Result<Json<Battle>, ApiError> {
    let _guard = lock_battle_tournament(&state, battle_id).await?;
    let battle = state
        .engine
        .complete_battle(battle_id, request.winner_id, request.is_draw)
        .await
        .map_err(api_error)?;
    log_transition(&request_id, "completed", &battle);
    Ok(Json(battle))
}

/// Forfeit a battle on behalf of one of its players; the opponent wins.
///
/// # Request Body
///
/// ```json
/// { "player_id": 7, "reason": "no show" }
/// ```
pub async fn forfeit_battle(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(battle_id): Path<BattleId>,
    Json(request): Json<ForfeitBattleRequest>,
) -> Result<Json<Battle>, ApiError> {
    let _guard = lock_battle_tournament(&state, battle_id).await?;
    let battle = state
        .engine
        .forfeit_battle(battle_id, request.player_id, request.reason)
        .await
        .map_err(api_error)?;
    log_transition(&request_id, "forfeited", &battle);
    Ok(Json(battle))
}

/// Cancel a battle without a winner.
pub async fn cancel_battle(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(battle_id): Path<BattleId>,
) -> Result<Json<Battle>, ApiError> {
    let _guard = lock_battle_tournament(&state, battle_id).await?;
    let battle = state
        .engine
        .cancel_battle(battle_id)
        .await
        .map_err(api_error)?;
    log_transition(&request_id, "cancelled", &battle);
    Ok(Json(battle))
}
