//! Battle lifecycle: scheduled, in progress, then a terminal state.

use chrono::{DateTime, Duration, Utc};

use super::errors::{BracketError, BracketResult};
use super::models::{Battle, BattleStatus, UserId};
use super::resolution::resolve_winner;
use crate::events::DomainEvent;

impl Battle {
    /// Whether the battle is being played
    pub fn is_active(&self) -> bool {
        self.status == BattleStatus::InProgress
    }

    /// Whether the battle may start at `now`
    pub fn can_start(&self, now: DateTime<Utc>) -> bool {
        self.status == BattleStatus::Scheduled && self.scheduled_at.is_none_or(|at| now >= at)
    }

    /// Time left before the battle times out, only while active
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        self.timeout_at
            .map(|timeout_at| (timeout_at - now).max(Duration::zero()))
    }

    /// Whether an active battle ran past its time limit
    pub fn has_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.timeout_at.is_some_and(|timeout_at| now >= timeout_at)
    }

    /// Begin play
    pub fn start(&mut self, now: DateTime<Utc>, timeout: Duration) -> BracketResult<DomainEvent> {
        if self.status != BattleStatus::Scheduled {
            return Err(self.invalid("start"));
        }
        if !self.can_start(now) {
            return Err(BracketError::BattleNotStartable {
                battle_id: self.id,
                scheduled_at: self.scheduled_at,
            });
        }

        let timeout_at = now + timeout;
        self.status = BattleStatus::InProgress;
        self.started_at = Some(now);
        self.timeout_at = Some(timeout_at);

        Ok(DomainEvent::BattleStarted {
            battle_id: self.id,
            tournament_id: self.tournament_id,
            round: self.round,
            started_at: now,
            timeout_at,
        })
    }

    /// Record both players' totals
    pub fn record_scores(&mut self, player1_score: i64, player2_score: i64) {
        self.player1_score = Some(player1_score);
        self.player2_score = Some(player2_score);
    }

    /// Finish with a winner, or without one for a draw
    pub fn complete(
        &mut self,
        winner: Option<UserId>,
        is_draw: bool,
        now: DateTime<Utc>,
    ) -> BracketResult<DomainEvent> {
        if self.status.is_terminal() {
            return Err(self.invalid("complete"));
        }
        if let Some(winner) = winner {
            self.ensure_player(winner)?;
        }

        self.status = BattleStatus::Completed;
        self.winner_id = winner;
        self.is_draw = is_draw || winner.is_none();
        self.finish(now);

        Ok(DomainEvent::BattleCompleted {
            battle_id: self.id,
            tournament_id: self.tournament_id,
            round: self.round,
            winner_id: self.winner_id,
            is_draw: self.is_draw,
            player1_score: self.player1_score,
            player2_score: self.player2_score,
        })
    }

    /// A player gives up; the opponent wins
    pub fn forfeit(
        &mut self,
        player: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> BracketResult<DomainEvent> {
        if self.status.is_terminal() {
            return Err(self.invalid("forfeit"));
        }
        let winner = self
            .opponent_of(player)
            .ok_or(BracketError::PlayerNotInBattle {
                battle_id: self.id,
                user_id: player,
            })?;

        self.status = BattleStatus::Forfeited;
        self.winner_id = Some(winner);
        self.is_draw = false;
        self.forfeit_reason = reason.clone();
        self.finish(now);

        Ok(DomainEvent::BattleForfeited {
            battle_id: self.id,
            tournament_id: self.tournament_id,
            round: self.round,
            forfeited_by: player,
            winner_id: winner,
            reason,
        })
    }

    /// Close the battle from both players' totals when its round ends
    ///
    /// Applies to any battle that has not already produced a result,
    /// cancelled ones included.
    pub fn settle(
        &mut self,
        player1_score: i64,
        player2_score: i64,
        now: DateTime<Utc>,
    ) -> DomainEvent {
        let winner = resolve_winner(
            self.player1_id,
            player1_score,
            self.player2_id,
            player2_score,
        );
        self.record_scores(player1_score, player2_score);
        self.status = BattleStatus::Completed;
        self.winner_id = Some(winner);
        self.is_draw = false;
        self.finish(now);

        DomainEvent::BattleCompleted {
            battle_id: self.id,
            tournament_id: self.tournament_id,
            round: self.round,
            winner_id: self.winner_id,
            is_draw: false,
            player1_score: self.player1_score,
            player2_score: self.player2_score,
        }
    }

    /// Call the battle off without a result
    pub fn cancel(&mut self, now: DateTime<Utc>) -> BracketResult<DomainEvent> {
        if self.status.is_terminal() {
            return Err(self.invalid("cancel"));
        }

        self.status = BattleStatus::Cancelled;
        self.winner_id = None;
        self.finish(now);

        Ok(DomainEvent::BattleCancelled {
            battle_id: self.id,
            tournament_id: self.tournament_id,
            round: self.round,
        })
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.battle_duration_secs = self
            .started_at
            .map(|started_at| (now - started_at).num_seconds().max(0));
    }

    fn ensure_player(&self, user_id: UserId) -> BracketResult<()> {
        if self.involves(user_id) {
            Ok(())
        } else {
            Err(BracketError::PlayerNotInBattle {
                battle_id: self.id,
                user_id,
            })
        }
    }

    fn invalid(&self, action: &'static str) -> BracketError {
        BracketError::InvalidBattleState {
            battle_id: self.id,
            action,
            actual: self.status,
        }
    }
}
