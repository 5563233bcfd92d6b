//! Bracket engine error types.

use super::models::{BattleId, BattleStatus, TournamentId, UserId};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Bracket engine errors
#[derive(Debug, Error)]
pub enum BracketError {
    /// Tournament does not exist
    #[error("Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    /// Battle does not exist
    #[error("Battle not found: {0}")]
    BattleNotFound(BattleId),

    /// Tournament already has a champion
    #[error("Tournament {0} is already completed")]
    TournamentCompleted(TournamentId),

    /// Pairing needs at least two distinct participants
    #[error("Not enough participants to pair: need 2, have {count}")]
    NotEnoughParticipants { count: usize },

    /// No battles exist for the requested round
    #[error("No battles found for tournament {tournament_id} round {round:?}")]
    NoBattlesForRound {
        tournament_id: TournamentId,
        round: Option<u32>,
    },

    /// Round produced no winners at all
    #[error("Round {round} of tournament {tournament_id} produced no winners")]
    NoWinners {
        tournament_id: TournamentId,
        round: u32,
    },

    /// Configured bracket size is not a power of two in 2..=32
    #[error("Invalid bracket size: {0}")]
    InvalidBracketSize(u32),

    /// Round numbers start at 1
    #[error("Invalid round: {0}")]
    InvalidRound(u32),

    /// Battle is not in a state that allows the transition
    #[error("Battle {battle_id} cannot {action} while {actual}")]
    InvalidBattleState {
        battle_id: BattleId,
        action: &'static str,
        actual: BattleStatus,
    },

    /// Battle start requested before its scheduled time
    #[error("Battle {battle_id} cannot start before {scheduled_at:?}")]
    BattleNotStartable {
        battle_id: BattleId,
        scheduled_at: Option<DateTime<Utc>>,
    },

    /// User does not play in the battle
    #[error("User {user_id} is not a player in battle {battle_id}")]
    PlayerNotInBattle { battle_id: BattleId, user_id: UserId },

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl BracketError {
    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            BracketError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_input_error(&self) -> bool {
        !matches!(self, BracketError::Store(_))
    }
}

/// Result type for bracket operations
pub type BracketResult<T> = Result<T, BracketError>;
