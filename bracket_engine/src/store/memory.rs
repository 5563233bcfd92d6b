//! In-memory implementation of the storage port.
//!
//! Used by tests and local tooling. Seeding helpers stand in for the external
//! systems (registration, qualification, question catalog, battle scoring)
//! that write those tables in production. Faults can be injected with
//! [`InMemoryStore::fail_on`] to exercise fallback and rollback paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BracketStore, StoreError, StoreResult, StoreTransaction};
use crate::bracket::models::{
    Battle, BattleAttempt, BattleId, BattleQuestion, BattleStatus, NewBattle, Participant,
    QualificationAttempt, Question, QuestionId, Tournament, TournamentId, TournamentStatus, UserId,
};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// `qualification_attempts`
    QualificationReads,
    /// `question_pool` and `topic_questions`
    QuestionReads,
    /// `insert_battle`
    BattleInserts,
    /// Transactional `save_battle` after the given number of successful saves
    TransactionalBattleSave { after: usize },
    /// Transaction commit
    Commit,
}

#[derive(Debug, Default)]
struct MemoryState {
    tournaments: BTreeMap<TournamentId, Tournament>,
    participants: Vec<Participant>,
    qualification_attempts: Vec<QualificationAttempt>,
    battles: BTreeMap<BattleId, Battle>,
    battle_attempts: Vec<BattleAttempt>,
    questions: BTreeMap<QuestionId, Question>,
    pools: HashMap<TournamentId, Vec<QuestionId>>,
    battle_questions: Vec<BattleQuestion>,
    byes: Vec<(TournamentId, u32, UserId)>,
    next_battle_id: BattleId,
    next_attempt_id: i64,
    failures: HashSet<FailurePoint>,
}

impl MemoryState {
    fn fails(&self, point: FailurePoint) -> StoreResult<()> {
        if self.failures.contains(&point) {
            Err(StoreError::Unavailable(format!("injected failure: {point:?}")))
        } else {
            Ok(())
        }
    }

    fn save_failure_threshold(&self) -> Option<usize> {
        self.failures.iter().find_map(|p| match p {
            FailurePoint::TransactionalBattleSave { after } => Some(*after),
            _ => None,
        })
    }
}

/// In-memory bracket store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        lock(&self.state)
    }

    /// Make an operation fail until [`InMemoryStore::clear_failures`] is called
    pub fn fail_on(&self, point: FailurePoint) {
        if let Ok(mut state) = self.state() {
            state.failures.insert(point);
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state() {
            state.failures.clear();
        }
    }

    /// Insert or replace a tournament
    pub fn insert_tournament(&self, tournament: Tournament) -> StoreResult<()> {
        self.state()?.tournaments.insert(tournament.id, tournament);
        Ok(())
    }

    /// Register a participant
    pub fn add_participant(&self, participant: Participant) -> StoreResult<()> {
        let mut state = self.state()?;
        let exists = state.participants.iter().any(|p| {
            p.tournament_id == participant.tournament_id && p.user_id == participant.user_id
        });
        if exists {
            return Err(StoreError::Conflict(format!(
                "participant {} already registered in tournament {}",
                participant.user_id, participant.tournament_id
            )));
        }
        state.participants.push(participant);
        Ok(())
    }

    /// Append a qualification attempt
    pub fn add_qualification_attempt(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        score: i64,
        duration_secs: i64,
    ) -> StoreResult<i64> {
        let mut state = self.state()?;
        state.next_attempt_id += 1;
        let id = state.next_attempt_id;
        state.qualification_attempts.push(QualificationAttempt {
            id,
            tournament_id,
            user_id,
            score,
            duration_secs,
            answers: serde_json::Value::Array(Vec::new()),
            submitted_at: Utc::now(),
        });
        Ok(id)
    }

    /// Record a scored answer in a battle
    pub fn add_battle_attempt(
        &self,
        battle_id: BattleId,
        player_id: UserId,
        question_id: QuestionId,
        points: i64,
    ) -> StoreResult<i64> {
        let mut state = self.state()?;
        state.next_attempt_id += 1;
        let id = state.next_attempt_id;
        state.battle_attempts.push(BattleAttempt {
            id,
            battle_id,
            player_id,
            question_id,
            answer: String::new(),
            points,
        });
        Ok(id)
    }

    /// Add a catalog question
    pub fn add_question(&self, question: Question) -> StoreResult<()> {
        self.state()?.questions.insert(question.id, question);
        Ok(())
    }

    /// Replace a tournament's curated question pool
    pub fn set_question_pool(
        &self,
        tournament_id: TournamentId,
        question_ids: Vec<QuestionId>,
    ) -> StoreResult<()> {
        self.state()?.pools.insert(tournament_id, question_ids);
        Ok(())
    }

    /// Every battle of a tournament ordered by id
    pub fn all_battles(&self, tournament_id: TournamentId) -> StoreResult<Vec<Battle>> {
        Ok(self
            .state()?
            .battles
            .values()
            .filter(|b| b.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    /// Questions attached to a battle ordered by position
    pub fn battle_questions(&self, battle_id: BattleId) -> StoreResult<Vec<BattleQuestion>> {
        let mut questions: Vec<BattleQuestion> = self
            .state()?
            .battle_questions
            .iter()
            .filter(|q| q.battle_id == battle_id)
            .copied()
            .collect();
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }
}

fn lock(state: &Mutex<MemoryState>) -> StoreResult<MutexGuard<'_, MemoryState>> {
    state
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store poisoned".to_string()))
}

fn write_tournament(state: &mut MemoryState, tournament: &Tournament) -> StoreResult<()> {
    let stored = state
        .tournaments
        .get_mut(&tournament.id)
        .ok_or_else(|| StoreError::NotFound(format!("tournament {}", tournament.id)))?;
    stored.status = tournament.status;
    stored.bracket_slots = tournament.bracket_slots;
    stored.winner_id = tournament.winner_id;
    Ok(())
}

fn write_battle(state: &mut MemoryState, battle: &Battle) -> StoreResult<()> {
    let stored = state
        .battles
        .get_mut(&battle.id)
        .ok_or_else(|| StoreError::NotFound(format!("battle {}", battle.id)))?;
    *stored = battle.clone();
    Ok(())
}

#[async_trait]
impl BracketStore for InMemoryStore {
    async fn get_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        Ok(self.state()?.tournaments.get(&tournament_id).cloned())
    }

    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        write_tournament(&mut *self.state()?, tournament)
    }

    async fn list_active_tournaments(&self) -> StoreResult<Vec<TournamentId>> {
        Ok(self
            .state()?
            .tournaments
            .values()
            .filter(|t| t.status == TournamentStatus::Active)
            .map(|t| t.id)
            .collect())
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        Ok(self
            .state()?
            .participants
            .iter()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn update_participant_seed(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        score: Option<i64>,
        rank: u32,
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        let participant = state
            .participants
            .iter_mut()
            .find(|p| p.tournament_id == tournament_id && p.user_id == user_id)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "participant {user_id} in tournament {tournament_id}"
                ))
            })?;
        participant.score = score;
        participant.rank = Some(rank);
        Ok(())
    }

    async fn qualification_attempts(
        &self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> StoreResult<Vec<QualificationAttempt>> {
        let state = self.state()?;
        state.fails(FailurePoint::QualificationReads)?;
        Ok(state
            .qualification_attempts
            .iter()
            .filter(|a| a.tournament_id == tournament_id && user_ids.contains(&a.user_id))
            .cloned()
            .collect())
    }

    async fn max_round(&self, tournament_id: TournamentId) -> StoreResult<Option<u32>> {
        Ok(self
            .state()?
            .battles
            .values()
            .filter(|b| b.tournament_id == tournament_id)
            .map(|b| b.round)
            .max())
    }

    async fn battles_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>> {
        Ok(self
            .state()?
            .battles
            .values()
            .filter(|b| b.tournament_id == tournament_id && b.round == round)
            .cloned()
            .collect())
    }

    async fn get_battle(&self, battle_id: BattleId) -> StoreResult<Option<Battle>> {
        Ok(self.state()?.battles.get(&battle_id).cloned())
    }

    async fn find_battle(
        &self,
        tournament_id: TournamentId,
        round: u32,
        player1_id: UserId,
        player2_id: UserId,
    ) -> StoreResult<Option<Battle>> {
        Ok(self
            .state()?
            .battles
            .values()
            .find(|b| {
                b.tournament_id == tournament_id
                    && b.round == round
                    && b.player1_id == player1_id
                    && b.player2_id == player2_id
            })
            .cloned())
    }

    async fn insert_battle(&self, battle: &NewBattle) -> StoreResult<Battle> {
        let mut state = self.state()?;
        state.fails(FailurePoint::BattleInserts)?;

        let duplicate = state.battles.values().any(|b| {
            b.tournament_id == battle.tournament_id
                && b.round == battle.round
                && b.player1_id == battle.player1_id
                && b.player2_id == battle.player2_id
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "battle ({}, {}, {}, {}) already exists",
                battle.tournament_id, battle.round, battle.player1_id, battle.player2_id
            )));
        }

        state.next_battle_id += 1;
        let created = Battle {
            id: state.next_battle_id,
            tournament_id: battle.tournament_id,
            round: battle.round,
            player1_id: battle.player1_id,
            player2_id: battle.player2_id,
            status: BattleStatus::Scheduled,
            player1_score: None,
            player2_score: None,
            winner_id: None,
            is_draw: false,
            forfeit_reason: None,
            scheduled_at: battle.scheduled_at,
            started_at: None,
            completed_at: None,
            timeout_at: None,
            battle_duration_secs: None,
            created_at: Utc::now(),
        };
        state.battles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save_battle(&self, battle: &Battle) -> StoreResult<()> {
        write_battle(&mut *self.state()?, battle)
    }

    async fn record_bye(
        &self,
        tournament_id: TournamentId,
        round: u32,
        user_id: UserId,
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        let key = (tournament_id, round, user_id);
        if !state.byes.contains(&key) {
            state.byes.push(key);
        }
        Ok(())
    }

    async fn round_byes(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<UserId>> {
        Ok(self
            .state()?
            .byes
            .iter()
            .filter(|(t, r, _)| *t == tournament_id && *r == round)
            .map(|(_, _, u)| *u)
            .collect())
    }

    async fn battle_question_ids(&self, battle_id: BattleId) -> StoreResult<Vec<QuestionId>> {
        Ok(self
            .battle_questions(battle_id)?
            .into_iter()
            .map(|q| q.question_id)
            .collect())
    }

    async fn question_pool(&self, tournament_id: TournamentId) -> StoreResult<Vec<QuestionId>> {
        let state = self.state()?;
        state.fails(FailurePoint::QuestionReads)?;
        Ok(state.pools.get(&tournament_id).cloned().unwrap_or_default())
    }

    async fn topic_questions(&self, topic: &str) -> StoreResult<Vec<QuestionId>> {
        let state = self.state()?;
        state.fails(FailurePoint::QuestionReads)?;
        Ok(state
            .questions
            .values()
            .filter(|q| q.topic.as_deref() == Some(topic))
            .map(|q| q.id)
            .collect())
    }

    async fn attach_questions(&self, questions: &[BattleQuestion]) -> StoreResult<()> {
        self.state()?.battle_questions.extend_from_slice(questions);
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            battles: BTreeMap::new(),
            tournaments: BTreeMap::new(),
            saves: 0,
        }))
    }
}

/// Transaction buffering writes until commit
struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    battles: BTreeMap<BattleId, Battle>,
    tournaments: BTreeMap<TournamentId, Tournament>,
    saves: usize,
}

impl MemoryTransaction {
    fn overlay(&self, battle: &Battle) -> Battle {
        self.battles
            .get(&battle.id)
            .cloned()
            .unwrap_or_else(|| battle.clone())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_round_battles(
        &mut self,
        tournament_id: TournamentId,
        round: u32,
    ) -> StoreResult<Vec<Battle>> {
        let state = lock(&self.state)?;
        Ok(state
            .battles
            .values()
            .filter(|b| b.tournament_id == tournament_id && b.round == round)
            .map(|b| self.overlay(b))
            .collect())
    }

    async fn lock_battle(&mut self, battle_id: BattleId) -> StoreResult<Option<Battle>> {
        let state = lock(&self.state)?;
        Ok(state.battles.get(&battle_id).map(|b| self.overlay(b)))
    }

    async fn battle_points(&mut self, battle_id: BattleId) -> StoreResult<HashMap<UserId, i64>> {
        let state = lock(&self.state)?;
        let mut points = HashMap::new();
        for attempt in state.battle_attempts.iter().filter(|a| a.battle_id == battle_id) {
            *points.entry(attempt.player_id).or_insert(0) += attempt.points;
        }
        Ok(points)
    }

    async fn save_battle(&mut self, battle: &Battle) -> StoreResult<()> {
        {
            let state = lock(&self.state)?;
            if !state.battles.contains_key(&battle.id) {
                return Err(StoreError::NotFound(format!("battle {}", battle.id)));
            }
            if state
                .save_failure_threshold()
                .is_some_and(|after| self.saves >= after)
            {
                return Err(StoreError::Unavailable(
                    "injected failure: transactional battle save".to_string(),
                ));
            }
        }
        self.saves += 1;
        self.battles.insert(battle.id, battle.clone());
        Ok(())
    }

    async fn save_tournament(&mut self, tournament: &Tournament) -> StoreResult<()> {
        self.tournaments.insert(tournament.id, tournament.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut state = lock(&self.state)?;
        state.fails(FailurePoint::Commit)?;
        for battle in self.battles.values() {
            write_battle(&mut state, battle)?;
        }
        for tournament in self.tournaments.values() {
            write_tournament(&mut state, tournament)?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_battle_rejects_duplicate_key() {
        let store = InMemoryStore::new();
        let nb = NewBattle::canonical(1, 1, 4, 2, None);
        let first = store.insert_battle(&nb).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.status, BattleStatus::Scheduled);

        let err = store.insert_battle(&nb).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transaction_writes_invisible_until_commit() {
        let store = InMemoryStore::new();
        let battle = store
            .insert_battle(&NewBattle::canonical(1, 1, 1, 2, None))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_battle(battle.id).await.unwrap().unwrap();
        locked.status = BattleStatus::Completed;
        tx.save_battle(&locked).await.unwrap();

        let outside = store.get_battle(battle.id).await.unwrap().unwrap();
        assert_eq!(outside.status, BattleStatus::Scheduled);

        // Reads inside the transaction see its own writes
        let inside = tx.lock_battle(battle.id).await.unwrap().unwrap();
        assert_eq!(inside.status, BattleStatus::Completed);

        tx.commit().await.unwrap();
        let outside = store.get_battle(battle.id).await.unwrap().unwrap();
        assert_eq!(outside.status, BattleStatus::Completed);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryStore::new();
        let battle = store
            .insert_battle(&NewBattle::canonical(1, 1, 1, 2, None))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_battle(battle.id).await.unwrap().unwrap();
        locked.winner_id = Some(1);
        tx.save_battle(&locked).await.unwrap();
        tx.rollback().await.unwrap();

        let stored = store.get_battle(battle.id).await.unwrap().unwrap();
        assert_eq!(stored.winner_id, None);
    }

    #[tokio::test]
    async fn test_battle_points_are_summed_per_player() {
        let store = InMemoryStore::new();
        store.add_battle_attempt(7, 1, 100, 3).unwrap();
        store.add_battle_attempt(7, 1, 101, 2).unwrap();
        store.add_battle_attempt(7, 2, 100, 4).unwrap();
        store.add_battle_attempt(8, 2, 100, 50).unwrap();

        let mut tx = store.begin().await.unwrap();
        let points = tx.battle_points(7).await.unwrap();
        assert_eq!(points.get(&1), Some(&5));
        assert_eq!(points.get(&2), Some(&4));
    }

    #[tokio::test]
    async fn test_injected_failure_and_clear() {
        let store = InMemoryStore::new();
        store.fail_on(FailurePoint::QualificationReads);
        assert!(store.qualification_attempts(1, &[1]).await.is_err());
        store.clear_failures();
        assert!(store.qualification_attempts(1, &[1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_participant_rejected() {
        let store = InMemoryStore::new();
        store.add_participant(Participant::new(1, 5)).unwrap();
        assert!(store.add_participant(Participant::new(1, 5)).is_err());
        assert!(store.add_participant(Participant::new(2, 5)).is_ok());
    }
}
