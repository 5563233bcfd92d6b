//! HTTP API for the bracket server.
//!
//! Exposes the engine's triggers (match generation, round closure), its read
//! surface and the battle transitions.
//!
//! # Modules
//!
//! - [`tournaments`]: Match generation, round closure and round status
//! - [`battles`]: Battle start, completion, forfeit and cancellation
//! - [`request_id`]: Request correlation middleware
//!
//! # Endpoints Overview
//!
//! - `POST /api/v1/tournaments/{id}/matches` - Generate a round's battles
//! - `POST /api/v1/tournaments/{id}/rounds/close` - Close a round and advance
//! - `GET  /api/v1/tournaments/{id}/rounds/{round}` - Round progress
//! - `POST /api/v1/battles/{id}/start` - Start a battle
//! - `POST /api/v1/battles/{id}/complete` - Complete a battle
//! - `POST /api/v1/battles/{id}/forfeit` - Forfeit a battle
//! - `POST /api/v1/battles/{id}/cancel` - Cancel a battle
//! - `GET  /health` - Server health status
//!
//! Every mutating call holds the tournament's lock from [`TournamentLocks`],
//! the same one the round scheduler takes.
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod battles;
pub mod request_id;
pub mod tournaments;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use bracket_engine::{BracketEngine, BracketError, Database};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::locks::TournamentLocks;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub engine: BracketEngine,
    pub locks: TournamentLocks,
    /// Pool checked by `/health`; absent when running on the in-memory store
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(engine: BracketEngine, locks: TournamentLocks) -> Self {
        Self {
            engine,
            locks,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Rejection type of the handlers
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error onto a status code and a client-safe message
pub fn api_error(err: BracketError) -> ApiError {
    let status = match &err {
        BracketError::TournamentNotFound(_) | BracketError::BattleNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        BracketError::TournamentCompleted(_)
        | BracketError::InvalidBattleState { .. }
        | BracketError::BattleNotStartable { .. } => StatusCode::CONFLICT,
        BracketError::NoWinners { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BracketError::NotEnoughParticipants { .. }
        | BracketError::NoBattlesForRound { .. }
        | BracketError::InvalidBracketSize(_)
        | BracketError::InvalidRound(_)
        | BracketError::PlayerNotInBattle { .. } => StatusCode::BAD_REQUEST,
        BracketError::Store(e) => {
            tracing::error!("Storage failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.client_message(),
        }),
    )
}

/// Create the complete API router with all endpoints and middleware.
///
/// ```text
/// GET  /health
/// POST /api/v1/tournaments/{id}/matches
/// POST /api/v1/tournaments/{id}/rounds/close
/// GET  /api/v1/tournaments/{id}/rounds/{round}
/// POST /api/v1/battles/{id}/start
/// POST /api/v1/battles/{id}/complete
/// POST /api/v1/battles/{id}/forfeit
/// POST /api/v1/battles/{id}/cancel
/// ```
///
/// # Example
///
/// ```rust,no_run
/// # use bracket_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    let tournament_routes = Router::new()
        .route(
            "/tournaments/{tournament_id}/matches",
            post(tournaments::generate_matches),
        )
        .route(
            "/tournaments/{tournament_id}/rounds/close",
            post(tournaments::close_round),
        )
        .route(
            "/tournaments/{tournament_id}/rounds/{round}",
            get(tournaments::round_status),
        );

    let battle_routes = Router::new()
        .route("/battles/{battle_id}/start", post(battles::start_battle))
        .route("/battles/{battle_id}/complete", post(battles::complete_battle))
        .route("/battles/{battle_id}/forfeit", post(battles::forfeit_battle))
        .route("/battles/{battle_id}/cancel", post(battles::cancel_battle));

    Router::new().merge(tournament_routes).merge(battle_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers (or none is configured), and
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","database":true,"timestamp":"2026-10-16T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.database {
        Some(db) => db.health_check().await.is_ok(),
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
