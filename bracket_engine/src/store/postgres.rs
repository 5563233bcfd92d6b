//! PostgreSQL implementation of the storage port.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::{BracketStore, StoreError, StoreResult, StoreTransaction};
use crate::bracket::models::{
    Battle, BattleId, BattleQuestion, NewBattle, Participant, QualificationAttempt, QuestionId,
    Tournament, TournamentId, TournamentStatus, UserId,
};
use crate::db::timeouts::{DEFAULT_QUERY_TIMEOUT, with_timeout};

macro_rules! battle_columns {
    () => {
        "id, tournament_id, round, player1_id, player2_id, status, player1_score, player2_score,
         winner_id, is_draw, forfeit_reason, scheduled_at, started_at, completed_at, timeout_at,
         battle_duration_secs, created_at"
    };
}

macro_rules! tournament_columns {
    () => {
        "id, name, topic, status, bracket_slots, battle_question_count, round_delay_days,
         qualifier_tie_breaker, winner_id, created_at"
    };
}

/// PostgreSQL bracket store
#[derive(Clone)]
pub struct PgBracketStore {
    pool: Arc<PgPool>,
    question_timeout: Duration,
}

impl PgBracketStore {
    /// Create a new store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            question_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the timeout applied to question catalog reads
    pub fn with_question_timeout(mut self, timeout: Duration) -> Self {
        self.question_timeout = timeout;
        self
    }
}

fn utc(value: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    value.map(|dt| dt.and_utc())
}

fn naive(value: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    value.map(|dt| dt.naive_utc())
}

fn battle_from_row(row: &PgRow) -> StoreResult<Battle> {
    let status: String = row.get("status");
    Ok(Battle {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        round: row.get::<i32, _>("round") as u32,
        player1_id: row.get("player1_id"),
        player2_id: row.get("player2_id"),
        status: status.parse().map_err(StoreError::Corrupt)?,
        player1_score: row.get("player1_score"),
        player2_score: row.get("player2_score"),
        winner_id: row.get("winner_id"),
        is_draw: row.get("is_draw"),
        forfeit_reason: row.get("forfeit_reason"),
        scheduled_at: utc(row.get("scheduled_at")),
        started_at: utc(row.get("started_at")),
        completed_at: utc(row.get("completed_at")),
        timeout_at: utc(row.get("timeout_at")),
        battle_duration_secs: row.get("battle_duration_secs"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn tournament_from_row(row: &PgRow) -> StoreResult<Tournament> {
    let status: String = row.get("status");
    let tie_breaker: String = row.get("qualifier_tie_breaker");
    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        topic: row.get("topic"),
        status: status.parse().map_err(StoreError::Corrupt)?,
        bracket_slots: row.get::<Option<i32>, _>("bracket_slots").map(|s| s as u32),
        battle_question_count: row.get::<i32, _>("battle_question_count").max(0) as u32,
        round_delay_days: row.get::<i32, _>("round_delay_days").max(0) as u32,
        qualifier_tie_breaker: tie_breaker.parse().map_err(StoreError::Corrupt)?,
        winner_id: row.get("winner_id"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
    })
}

async fn update_tournament<'e, E>(executor: E, tournament: &Tournament) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE tournaments SET status = $1, bracket_slots = $2, winner_id = $3 WHERE id = $4",
    )
    .bind(tournament.status.to_string())
    .bind(tournament.bracket_slots.map(|s| s as i32))
    .bind(tournament.winner_id)
    .bind(tournament.id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("tournament {}", tournament.id)));
    }
    Ok(())
}

async fn update_battle<'e, E>(executor: E, battle: &Battle) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE battles
        SET status = $1, player1_score = $2, player2_score = $3, winner_id = $4, is_draw = $5,
            forfeit_reason = $6, scheduled_at = $7, started_at = $8, completed_at = $9,
            timeout_at = $10, battle_duration_secs = $11
        WHERE id = $12
        "#,
    )
    .bind(battle.status.to_string())
    .bind(battle.player1_score)
    .bind(battle.player2_score)
    .bind(battle.winner_id)
    .bind(battle.is_draw)
    .bind(&battle.forfeit_reason)
    .bind(naive(battle.scheduled_at))
    .bind(naive(battle.started_at))
    .bind(naive(battle.completed_at))
    .bind(naive(battle.timeout_at))
    .bind(battle.battle_duration_secs)
    .bind(battle.id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("battle {}", battle.id)));
    }
    Ok(())
}

#[async_trait]
impl BracketStore for PgBracketStore {
    async fn get_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            tournament_columns!(),
            " FROM tournaments WHERE id = $1"
        ))
        .bind(tournament_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        update_tournament(self.pool.as_ref(), tournament).await
    }

    async fn list_active_tournaments(&self) -> StoreResult<Vec<TournamentId>> {
        let rows = sqlx::query("SELECT id FROM tournaments WHERE status = $1 ORDER BY id")
            .bind(TournamentStatus::Active.to_string())
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query(
            r#"
            SELECT tournament_id, user_id, score, rank, status, registered_at
            FROM tournament_participants
            WHERE tournament_id = $1
            ORDER BY registered_at, user_id
            "#,
        )
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(Participant {
                    tournament_id: row.get("tournament_id"),
                    user_id: row.get("user_id"),
                    score: row.get("score"),
                    rank: row.get::<Option<i32>, _>("rank").map(|r| r as u32),
                    status: status.parse().map_err(StoreError::Corrupt)?,
                    registered_at: row.get::<NaiveDateTime, _>("registered_at").and_utc(),
                })
            })
            .collect()
    }

    async fn update_participant_seed(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        score: Option<i64>,
        rank: u32,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tournament_participants SET score = $1, rank = $2 WHERE tournament_id = $3 AND user_id = $4",
        )
        .bind(score)
        .bind(rank as i32)
        .bind(tournament_id)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "participant {user_id} in tournament {tournament_id}"
            )));
        }
        Ok(())
    }

    async fn qualification_attempts(
        &self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> StoreResult<Vec<QualificationAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, user_id, score, duration_secs, answers, submitted_at
            FROM qualification_attempts
            WHERE tournament_id = $1 AND user_id = ANY($2)
            ORDER BY score DESC, duration_secs ASC, id ASC
            "#,
        )
        .bind(tournament_id)
        .bind(user_ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| QualificationAttempt {
                id: row.get("id"),
                tournament_id: row.get("tournament_id"),
                user_id: row.get("user_id"),
                score: row.get("score"),
                duration_secs: row.get("duration_secs"),
                answers: row.get("answers"),
                submitted_at: row.get::<NaiveDateTime, _>("submitted_at").and_utc(),
            })
            .collect())
    }

    async fn max_round(&self, tournament_id: TournamentId) -> StoreResult<Option<u32>> {
        let row = sqlx::query("SELECT MAX(round) AS max_round FROM battles WHERE tournament_id = $1")
            .bind(tournament_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(row.get::<Option<i32>, _>("max_round").map(|r| r as u32))
    }

    async fn battles_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            battle_columns!(),
            " FROM battles WHERE tournament_id = $1 AND round = $2 ORDER BY id"
        ))
        .bind(tournament_id)
        .bind(round as i32)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(battle_from_row).collect()
    }

    async fn get_battle(&self, battle_id: BattleId) -> StoreResult<Option<Battle>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            battle_columns!(),
            " FROM battles WHERE id = $1"
        ))
        .bind(battle_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(battle_from_row).transpose()
    }

    async fn find_battle(
        &self,
        tournament_id: TournamentId,
        round: u32,
        player1_id: UserId,
        player2_id: UserId,
    ) -> StoreResult<Option<Battle>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            battle_columns!(),
            " FROM battles WHERE tournament_id = $1 AND round = $2 AND player1_id = $3 AND player2_id = $4"
        ))
        .bind(tournament_id)
        .bind(round as i32)
        .bind(player1_id)
        .bind(player2_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(battle_from_row).transpose()
    }

    async fn insert_battle(&self, battle: &NewBattle) -> StoreResult<Battle> {
        // The unique key turns a concurrent duplicate into an empty RETURNING
        let row = sqlx::query(concat!(
            "INSERT INTO battles (tournament_id, round, player1_id, player2_id, status, scheduled_at)
             VALUES ($1, $2, $3, $4, 'scheduled', $5)
             ON CONFLICT (tournament_id, round, player1_id, player2_id) DO NOTHING
             RETURNING ",
            battle_columns!()
        ))
        .bind(battle.tournament_id)
        .bind(battle.round as i32)
        .bind(battle.player1_id)
        .bind(battle.player2_id)
        .bind(naive(battle.scheduled_at))
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => battle_from_row(&row),
            None => Err(StoreError::Conflict(format!(
                "battle ({}, {}, {}, {}) already exists",
                battle.tournament_id, battle.round, battle.player1_id, battle.player2_id
            ))),
        }
    }

    async fn save_battle(&self, battle: &Battle) -> StoreResult<()> {
        update_battle(self.pool.as_ref(), battle).await
    }

    async fn record_bye(
        &self,
        tournament_id: TournamentId,
        round: u32,
        user_id: UserId,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tournament_round_byes (tournament_id, round, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tournament_id)
        .bind(round as i32)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn round_byes(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT user_id FROM tournament_round_byes WHERE tournament_id = $1 AND round = $2 ORDER BY created_at, user_id",
        )
        .bind(tournament_id)
        .bind(round as i32)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }

    async fn battle_question_ids(&self, battle_id: BattleId) -> StoreResult<Vec<QuestionId>> {
        let rows = sqlx::query(
            "SELECT question_id FROM battle_questions WHERE battle_id = $1 ORDER BY position",
        )
        .bind(battle_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(|row| row.get("question_id")).collect())
    }

    async fn question_pool(&self, tournament_id: TournamentId) -> StoreResult<Vec<QuestionId>> {
        let rows = with_timeout(
            self.question_timeout,
            sqlx::query(
                "SELECT question_id FROM tournament_questions WHERE tournament_id = $1 ORDER BY position, question_id",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(rows.into_iter().map(|row| row.get("question_id")).collect())
    }

    async fn topic_questions(&self, topic: &str) -> StoreResult<Vec<QuestionId>> {
        let rows = with_timeout(
            self.question_timeout,
            sqlx::query("SELECT id FROM questions WHERE topic = $1 ORDER BY id")
                .bind(topic)
                .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn attach_questions(&self, questions: &[BattleQuestion]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for question in questions {
            sqlx::query(
                r#"
                INSERT INTO battle_questions (battle_id, question_id, position)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(question.battle_id)
            .bind(question.question_id)
            .bind(question.position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

/// PostgreSQL transaction using `FOR UPDATE` row locks
struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_round_battles(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            battle_columns!(),
            " FROM battles WHERE tournament_id = $1 AND round = $2 ORDER BY id FOR UPDATE"
        ))
        .bind(tournament_id)
        .bind(round as i32)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(battle_from_row).collect()
    }

    async fn lock_battle(&mut self, battle_id: BattleId) -> StoreResult<Option<Battle>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            battle_columns!(),
            " FROM battles WHERE id = $1 FOR UPDATE"
        ))
        .bind(battle_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(battle_from_row).transpose()
    }

    async fn battle_points(&mut self, battle_id: BattleId) -> StoreResult<HashMap<UserId, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT player_id, COALESCE(SUM(points), 0)::BIGINT AS points
            FROM battle_attempts
            WHERE battle_id = $1
            GROUP BY player_id
            "#,
        )
        .bind(battle_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("player_id"), row.get("points")))
            .collect())
    }

    async fn save_battle(&mut self, battle: &Battle) -> StoreResult<()> {
        update_battle(&mut *self.tx, battle).await
    }

    async fn save_tournament(&mut self, tournament: &Tournament) -> StoreResult<()> {
        update_tournament(&mut *self.tx, tournament).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
