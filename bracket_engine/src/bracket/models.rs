//! Bracket data models: tournaments, participants, attempts and battles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Tournament ID type
pub type TournamentId = i64;

/// User ID type
pub type UserId = i64;

/// Battle ID type
pub type BattleId = i64;

/// Question ID type
pub type QuestionId = i64;

/// Tournament status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Registration and qualification phase
    Upcoming,
    /// Bracket generated, rounds being played
    Active,
    /// Champion decided
    Completed,
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TournamentStatus::Upcoming => write!(f, "upcoming"),
            TournamentStatus::Active => write!(f, "active"),
            TournamentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(TournamentStatus::Upcoming),
            "active" => Ok(TournamentStatus::Active),
            "completed" => Ok(TournamentStatus::Completed),
            other => Err(format!("unknown tournament status: {other}")),
        }
    }
}

/// How qualification attempts with equal scores are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualifierTieBreaker {
    /// Faster completion wins
    #[default]
    Duration,
    /// Earlier submission wins
    SubmittedAt,
}

impl fmt::Display for QualifierTieBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualifierTieBreaker::Duration => write!(f, "duration"),
            QualifierTieBreaker::SubmittedAt => write!(f, "submitted_at"),
        }
    }
}

impl FromStr for QualifierTieBreaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duration" => Ok(QualifierTieBreaker::Duration),
            "submitted_at" => Ok(QualifierTieBreaker::SubmittedAt),
            other => Err(format!("unknown qualifier tie breaker: {other}")),
        }
    }
}

/// Tournament record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    /// Topic used to backfill battle questions when the curated pool runs short
    pub topic: Option<String>,
    pub status: TournamentStatus,
    /// Fixed bracket size; derived from the entrant count when unset
    pub bracket_slots: Option<u32>,
    pub battle_question_count: u32,
    pub round_delay_days: u32,
    pub qualifier_tie_breaker: QualifierTieBreaker,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    /// Create a new upcoming tournament with default bracket settings
    pub fn new(id: TournamentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            topic: None,
            status: TournamentStatus::Upcoming,
            bracket_slots: None,
            battle_question_count: 10,
            round_delay_days: 1,
            qualifier_tie_breaker: QualifierTieBreaker::Duration,
            winner_id: None,
            created_at: Utc::now(),
        }
    }

    /// Set a topic for question backfill
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Fix the bracket size
    pub fn with_bracket_slots(mut self, slots: u32) -> Self {
        self.bracket_slots = Some(slots);
        self
    }

    /// Set the number of questions attached to each battle
    pub fn with_question_count(mut self, count: u32) -> Self {
        self.battle_question_count = count;
        self
    }

    /// Set the number of days between rounds
    pub fn with_round_delay_days(mut self, days: u32) -> Self {
        self.round_delay_days = days;
        self
    }

    /// Days between rounds, never less than one
    pub fn effective_round_delay_days(&self) -> i64 {
        i64::from(self.round_delay_days.max(1))
    }
}

/// Participant approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Approved,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantStatus::Pending => write!(f, "pending"),
            ParticipantStatus::Approved => write!(f, "approved"),
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "approved" => Ok(ParticipantStatus::Approved),
            other => Err(format!("unknown participant status: {other}")),
        }
    }
}

/// Tournament entrant (unique per tournament and user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    /// Best qualification score, written when the bracket is seeded
    pub score: Option<i64>,
    /// Seed rank (1 is the strongest), written when the bracket is seeded
    pub rank: Option<u32>,
    pub status: ParticipantStatus,
    pub registered_at: DateTime<Utc>,
}

impl Participant {
    /// Create an approved, unseeded participant
    pub fn new(tournament_id: TournamentId, user_id: UserId) -> Self {
        Self {
            tournament_id,
            user_id,
            score: None,
            rank: None,
            status: ParticipantStatus::Approved,
            registered_at: Utc::now(),
        }
    }

    /// Set the seed rank
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }
}

/// Pre-bracket scored attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualificationAttempt {
    pub id: i64,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub score: i64,
    pub duration_secs: i64,
    pub answers: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

/// Battle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Scheduled,
    InProgress,
    Completed,
    Forfeited,
    Cancelled,
}

impl BattleStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BattleStatus::Completed | BattleStatus::Forfeited | BattleStatus::Cancelled
        )
    }

    /// Whether the battle produced a result (and possibly a winner)
    pub fn is_decided(self) -> bool {
        matches!(self, BattleStatus::Completed | BattleStatus::Forfeited)
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BattleStatus::Scheduled => write!(f, "scheduled"),
            BattleStatus::InProgress => write!(f, "in_progress"),
            BattleStatus::Completed => write!(f, "completed"),
            BattleStatus::Forfeited => write!(f, "forfeited"),
            BattleStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for BattleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BattleStatus::Scheduled),
            "in_progress" => Ok(BattleStatus::InProgress),
            "completed" => Ok(BattleStatus::Completed),
            "forfeited" => Ok(BattleStatus::Forfeited),
            "cancelled" => Ok(BattleStatus::Cancelled),
            other => Err(format!("unknown battle status: {other}")),
        }
    }
}

/// One pairing within a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub tournament_id: TournamentId,
    pub round: u32,
    /// Always the lower of the two user ids
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub status: BattleStatus,
    pub player1_score: Option<i64>,
    pub player2_score: Option<i64>,
    pub winner_id: Option<UserId>,
    pub is_draw: bool,
    pub forfeit_reason: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub battle_duration_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Battle {
    /// Whether the user plays in this battle
    pub fn involves(&self, user_id: UserId) -> bool {
        self.player1_id == user_id || self.player2_id == user_id
    }

    /// The other player, if `user_id` plays in this battle
    pub fn opponent_of(&self, user_id: UserId) -> Option<UserId> {
        if self.player1_id == user_id {
            Some(self.player2_id)
        } else if self.player2_id == user_id {
            Some(self.player1_id)
        } else {
            None
        }
    }
}

/// Battle to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBattle {
    pub tournament_id: TournamentId,
    pub round: u32,
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewBattle {
    /// Build a battle in canonical order (lower user id first)
    pub fn canonical(
        tournament_id: TournamentId,
        round: u32,
        a: UserId,
        b: UserId,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            tournament_id,
            round,
            player1_id: a.min(b),
            player2_id: a.max(b),
            scheduled_at,
        }
    }
}

/// Raw per-question scoring input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleAttempt {
    pub id: i64,
    pub battle_id: BattleId,
    pub player_id: UserId,
    pub question_id: QuestionId,
    pub answer: String,
    pub points: i64,
}

/// Question from the external catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub topic: Option<String>,
    pub prompt: String,
}

/// Question attached to a battle at a position (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleQuestion {
    pub battle_id: BattleId,
    pub question_id: QuestionId,
    pub position: u32,
}

/// Summary of a round's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round: u32,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub is_complete: bool,
    pub battle_ids: Vec<BattleId>,
}

impl RoundStatus {
    /// Summarize a round from its battles
    pub fn from_battles(round: u32, battles: &[Battle]) -> Self {
        let total = battles.len();
        let completed = battles.iter().filter(|b| b.status.is_decided()).count();
        let pending = total - completed;

        Self {
            round,
            total,
            completed,
            pending,
            is_complete: total > 0 && pending == 0,
            battle_ids: battles.iter().map(|b| b.id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battle(id: BattleId, status: BattleStatus) -> Battle {
        Battle {
            id,
            tournament_id: 1,
            round: 1,
            player1_id: 1,
            player2_id: 2,
            status,
            player1_score: None,
            player2_score: None,
            winner_id: None,
            is_draw: false,
            forfeit_reason: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            timeout_at: None,
            battle_duration_secs: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_battle_is_canonical() {
        let nb = NewBattle::canonical(1, 1, 9, 3, None);
        assert_eq!(nb.player1_id, 3);
        assert_eq!(nb.player2_id, 9);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            BattleStatus::Scheduled,
            BattleStatus::InProgress,
            BattleStatus::Completed,
            BattleStatus::Forfeited,
            BattleStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<BattleStatus>(), Ok(status));
        }
        assert!("finished".parse::<TournamentStatus>().is_err());
    }

    #[test]
    fn test_round_status_counts_decided_battles() {
        let battles = vec![
            battle(1, BattleStatus::Completed),
            battle(2, BattleStatus::Forfeited),
            battle(3, BattleStatus::Scheduled),
        ];
        let status = RoundStatus::from_battles(2, &battles);
        assert_eq!(status.total, 3);
        assert_eq!(status.completed, 2);
        assert_eq!(status.pending, 1);
        assert!(!status.is_complete);
        assert_eq!(status.battle_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_round_is_not_complete() {
        assert!(!RoundStatus::from_battles(1, &[]).is_complete);
    }

    #[test]
    fn test_effective_round_delay_floors_at_one() {
        let t = Tournament::new(1, "Cup").with_round_delay_days(0);
        assert_eq!(t.effective_round_delay_days(), 1);
        let t = t.with_round_delay_days(3);
        assert_eq!(t.effective_round_delay_days(), 3);
    }

    #[test]
    fn test_opponent_of() {
        let b = battle(1, BattleStatus::Scheduled);
        assert_eq!(b.opponent_of(1), Some(2));
        assert_eq!(b.opponent_of(2), Some(1));
        assert_eq!(b.opponent_of(7), None);
    }
}
