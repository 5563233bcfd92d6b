//! Storage port for the bracket engine.
//!
//! The engine only talks to persistence through [`BracketStore`] and the
//! [`StoreTransaction`] it hands out, so the PostgreSQL adapter can be swapped
//! for the in-memory one in tests.
//!
//! Besides the engine's own tables, the port exposes the read side of the
//! external collaborators it consumes: qualification attempts, the question
//! pool and the per-battle scoring attempts.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::bracket::models::{
    Battle, BattleId, BattleQuestion, NewBattle, Participant, QualificationAttempt, QuestionId,
    Tournament, TournamentId, UserId,
};

pub mod errors;
pub mod memory;
pub mod postgres;

pub use errors::{StoreError, StoreResult};
pub use memory::{FailurePoint, InMemoryStore};
pub use postgres::PgBracketStore;

/// Trait for bracket persistence operations
#[async_trait]
pub trait BracketStore: Send + Sync {
    /// Get a tournament
    async fn get_tournament(&self, tournament_id: TournamentId)
    -> StoreResult<Option<Tournament>>;

    /// Persist tournament status, bracket slots and winner
    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()>;

    /// IDs of tournaments whose rounds are being played
    async fn list_active_tournaments(&self) -> StoreResult<Vec<TournamentId>>;

    /// Registered participants in registration order
    async fn list_participants(&self, tournament_id: TournamentId)
    -> StoreResult<Vec<Participant>>;

    /// Write the seed attributes of a participant
    async fn update_participant_seed(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        score: Option<i64>,
        rank: u32,
    ) -> StoreResult<()>;

    /// All qualification attempts of the given users
    async fn qualification_attempts(
        &self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> StoreResult<Vec<QualificationAttempt>>;

    /// Highest round that has battles
    async fn max_round(&self, tournament_id: TournamentId) -> StoreResult<Option<u32>>;

    /// Battles of a round ordered by id
    async fn battles_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>>;

    /// Get a battle
    async fn get_battle(&self, battle_id: BattleId) -> StoreResult<Option<Battle>>;

    /// Find a battle by its canonical key
    async fn find_battle(
        &self,
        tournament_id: TournamentId,
        round: u32,
        player1_id: UserId,
        player2_id: UserId,
    ) -> StoreResult<Option<Battle>>;

    /// Insert a scheduled battle; `StoreError::Conflict` if the canonical key exists
    async fn insert_battle(&self, battle: &NewBattle) -> StoreResult<Battle>;

    /// Persist every mutable battle column
    async fn save_battle(&self, battle: &Battle) -> StoreResult<()>;

    /// Record that a user advances from a round without an opponent
    async fn record_bye(
        &self,
        tournament_id: TournamentId,
        round: u32,
        user_id: UserId,
    ) -> StoreResult<()>;

    /// Users that received a bye in a round
    async fn round_byes(&self, tournament_id: TournamentId, round: u32)
    -> StoreResult<Vec<UserId>>;

    /// Questions already attached to a battle, by position
    async fn battle_question_ids(&self, battle_id: BattleId) -> StoreResult<Vec<QuestionId>>;

    /// The tournament's curated question pool in pool order
    async fn question_pool(&self, tournament_id: TournamentId) -> StoreResult<Vec<QuestionId>>;

    /// All catalog questions with the given topic
    async fn topic_questions(&self, topic: &str) -> StoreResult<Vec<QuestionId>>;

    /// Attach questions to a battle
    async fn attach_questions(&self, questions: &[BattleQuestion]) -> StoreResult<()>;

    /// Start a transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// Unit of work with row-level locking
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock and return the battles of a round ordered by id
    async fn lock_round_battles(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>>;

    /// Lock and return a single battle
    async fn lock_battle(&mut self, battle_id: BattleId) -> StoreResult<Option<Battle>>;

    /// Summed attempt points per player for a battle
    async fn battle_points(&mut self, battle_id: BattleId) -> StoreResult<HashMap<UserId, i64>>;

    /// Persist every mutable battle column
    async fn save_battle(&mut self, battle: &Battle) -> StoreResult<()>;

    /// Persist tournament status, bracket slots and winner
    async fn save_tournament(&mut self, tournament: &Tournament) -> StoreResult<()>;

    /// Make all writes durable
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard all writes
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
