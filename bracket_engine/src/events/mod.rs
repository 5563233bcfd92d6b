//! Domain events and the notifier that dispatches them.
//!
//! Mutating engine operations describe what happened as [`DomainEvent`]s.
//! Events raised while a transaction is open are collected in an
//! [`EventScope`] and only handed to the [`EventSink`] once the data is
//! durable; a rolled back scope is simply dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bracket::models::{BattleId, TournamentId, UserId};

pub mod achievements;
pub mod notifier;
pub mod sinks;

pub use achievements::{
    Achievement, AchievementKind, AchievementNotifier, LogAchievementNotifier, NotifyError,
    RecordingAchievementNotifier,
};
pub use notifier::{EventNotifier, EventScope};
pub use sinks::{BroadcastSink, LogSink, RecordingSink};

/// Something observable that happened to a battle or round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BattleStarted {
        battle_id: BattleId,
        tournament_id: TournamentId,
        round: u32,
        started_at: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    },
    BattleCompleted {
        battle_id: BattleId,
        tournament_id: TournamentId,
        round: u32,
        winner_id: Option<UserId>,
        is_draw: bool,
        player1_score: Option<i64>,
        player2_score: Option<i64>,
    },
    BattleForfeited {
        battle_id: BattleId,
        tournament_id: TournamentId,
        round: u32,
        forfeited_by: UserId,
        winner_id: UserId,
        reason: Option<String>,
    },
    BattleCancelled {
        battle_id: BattleId,
        tournament_id: TournamentId,
        round: u32,
    },
    RoundClosed {
        tournament_id: TournamentId,
        round: u32,
        winners: Vec<UserId>,
        next_round: Option<u32>,
        complete: bool,
        winner_id: Option<UserId>,
    },
}

impl DomainEvent {
    /// Tournament the event belongs to
    pub fn tournament_id(&self) -> TournamentId {
        match self {
            DomainEvent::BattleStarted { tournament_id, .. }
            | DomainEvent::BattleCompleted { tournament_id, .. }
            | DomainEvent::BattleForfeited { tournament_id, .. }
            | DomainEvent::BattleCancelled { tournament_id, .. }
            | DomainEvent::RoundClosed { tournament_id, .. } => *tournament_id,
        }
    }

    /// Short name used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::BattleStarted { .. } => "battle_started",
            DomainEvent::BattleCompleted { .. } => "battle_completed",
            DomainEvent::BattleForfeited { .. } => "battle_forfeited",
            DomainEvent::BattleCancelled { .. } => "battle_cancelled",
            DomainEvent::RoundClosed { .. } => "round_closed",
        }
    }
}

/// Event delivery errors
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event channel closed")]
    Closed,

    #[error("Event rejected: {0}")]
    Rejected(String),
}

/// Destination for domain events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventError>;
}
