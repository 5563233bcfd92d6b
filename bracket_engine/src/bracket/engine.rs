//! Bracket engine: match generation, round closure and battle transitions.

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::errors::{BracketError, BracketResult};
use super::models::{
    Battle, BattleId, RoundStatus, Tournament, TournamentId, TournamentStatus, UserId,
};
use super::pairing::{BracketPairer, RoundSchedule};
use super::qualifier::{
    QualifierSelector, Selection, calculate_optimal_bracket_size, is_valid_bracket_size,
};
use super::resolution::{compute_round_winners, resolve_winner};
use crate::config::EngineConfig;
use crate::events::{
    Achievement, AchievementNotifier, DomainEvent, EventNotifier, EventScope,
    LogAchievementNotifier,
};
use crate::store::{BracketStore, StoreTransaction};

/// Result of generating a round's matches
#[derive(Debug, Clone)]
pub struct GeneratedMatches {
    pub tournament_id: TournamentId,
    pub round: u32,
    /// Bracket size used for round 1 selection
    pub bracket_slots: Option<u32>,
    /// Qualifier selection, round 1 only
    pub selection: Option<Selection>,
    pub schedule: RoundSchedule,
}

/// Result of closing a round
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// The round's window is still open; nothing was changed
    NotReady {
        round: u32,
        ready_at: DateTime<Utc>,
    },
    /// Winners were paired into the next round
    Advanced {
        round: u32,
        winners: Vec<UserId>,
        next_round: u32,
        schedule: RoundSchedule,
    },
    /// The tournament has a champion
    Completed { round: u32, winner_id: UserId },
}

impl RoundOutcome {
    /// Short name used in logs and responses
    pub fn label(&self) -> &'static str {
        match self {
            RoundOutcome::NotReady { .. } => "not_ready",
            RoundOutcome::Advanced { .. } => "advanced",
            RoundOutcome::Completed { .. } => "completed",
        }
    }
}

/// Tournament bracket engine
///
/// Operations are sequential and spawn nothing. Callers that may race on the
/// same tournament must serialize those calls themselves.
#[derive(Clone)]
pub struct BracketEngine {
    store: Arc<dyn BracketStore>,
    pairer: BracketPairer,
    selector: QualifierSelector,
    notifier: EventNotifier,
    achievements: Arc<dyn AchievementNotifier>,
    config: EngineConfig,
}

impl BracketEngine {
    /// Create an engine with the given collaborators
    pub fn new(
        store: Arc<dyn BracketStore>,
        notifier: EventNotifier,
        achievements: Arc<dyn AchievementNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pairer: BracketPairer::new(store.clone()),
            selector: QualifierSelector::new(store.clone()),
            store,
            notifier,
            achievements,
            config,
        }
    }

    /// Create an engine that logs events and achievements
    pub fn with_store(store: Arc<dyn BracketStore>) -> Self {
        Self::new(
            store,
            EventNotifier::default(),
            Arc::new(LogAchievementNotifier),
            EngineConfig::default(),
        )
    }

    pub fn store(&self) -> &Arc<dyn BracketStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn load_tournament(&self, tournament_id: TournamentId) -> BracketResult<Tournament> {
        self.store
            .get_tournament(tournament_id)
            .await?
            .ok_or(BracketError::TournamentNotFound(tournament_id))
    }

    /// Pair a round's participants, now
    pub async fn generate_matches(
        &self,
        tournament_id: TournamentId,
        participants: Option<&[UserId]>,
        round: u32,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> BracketResult<GeneratedMatches> {
        self.generate_matches_at(tournament_id, participants, round, scheduled_at, Utc::now())
            .await
    }

    /// Pair a round's participants
    ///
    /// Without explicit participants the tournament's registered entrants
    /// are used. Round 1 runs qualifier selection against the configured or
    /// derived bracket size and writes the resulting seeds; once seeds exist
    /// a rerun keeps them and pairs the same battles. The tournament becomes
    /// active once battles exist.
    pub async fn generate_matches_at(
        &self,
        tournament_id: TournamentId,
        participants: Option<&[UserId]>,
        round: u32,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> BracketResult<GeneratedMatches> {
        if round == 0 {
            return Err(BracketError::InvalidRound(round));
        }

        let mut tournament = self.load_tournament(tournament_id).await?;
        if tournament.status == TournamentStatus::Completed {
            return Err(BracketError::TournamentCompleted(tournament_id));
        }
        if let Some(slots) = tournament.bracket_slots
            && !is_valid_bracket_size(slots)
        {
            return Err(BracketError::InvalidBracketSize(slots));
        }

        let registered = self.store.list_participants(tournament_id).await?;
        let seeds: HashMap<UserId, u32> = registered
            .iter()
            .filter_map(|p| p.rank.map(|rank| (p.user_id, rank)))
            .collect();
        let registered: Vec<UserId> = registered.iter().map(|p| p.user_id).collect();
        let mut entrants = dedup(participants.unwrap_or(registered.as_slice()));

        // Seeds already written by an earlier call fix the entry order
        let seeded = round == 1 && !seeds.is_empty();
        if seeded {
            entrants.sort_by_key(|user| seeds.get(user).copied().unwrap_or(u32::MAX));
        } else if round == 1
            && tournament.status == TournamentStatus::Upcoming
            && self.config.shuffle_first_round
        {
            let mut rng = rand::rng();
            entrants.shuffle(&mut rng);
        }

        let mut tournament_dirty = false;
        let mut selection = None;
        if round == 1 {
            let slots = match tournament.bracket_slots {
                Some(slots) => slots,
                None => {
                    let slots = calculate_optimal_bracket_size(entrants.len());
                    tournament.bracket_slots = Some(slots);
                    tournament_dirty = true;
                    slots
                }
            };

            let selected = self
                .selector
                .select(&tournament, slots as usize, &entrants)
                .await;
            if let Some(fallback) = &selected.fallback {
                warn!(
                    "Tournament {} seeded by entry order ({:?})",
                    tournament_id, fallback
                );
            }
            if !seeded {
                self.write_seeds(tournament_id, &registered, &selected)
                    .await?;
            }

            entrants = selected.selected.clone();
            selection = Some(selected);
        }

        let scheduled_at = scheduled_at.unwrap_or(now);
        let schedule = self
            .pairer
            .schedule_round(&tournament, &entrants, round, Some(scheduled_at))
            .await?;

        if tournament.status != TournamentStatus::Active {
            tournament.status = TournamentStatus::Active;
            tournament_dirty = true;
        }
        if tournament_dirty {
            self.store.save_tournament(&tournament).await?;
        }

        info!(
            "Generated round {} of tournament {}: {} battles, bye {:?}",
            round,
            tournament_id,
            schedule.battles.len(),
            schedule.bye
        );

        Ok(GeneratedMatches {
            tournament_id,
            round,
            bracket_slots: tournament.bracket_slots,
            selection,
            schedule,
        })
    }

    /// Persist 1-based selection ranks on registered participants
    async fn write_seeds(
        &self,
        tournament_id: TournamentId,
        registered: &[UserId],
        selection: &Selection,
    ) -> BracketResult<()> {
        let registered: HashSet<UserId> = registered.iter().copied().collect();
        for (rank, user_id) in (1u32..).zip(selection.selected.iter().copied()) {
            if !registered.contains(&user_id) {
                continue;
            }
            let score = selection.best_scores.get(&user_id).copied();
            self.store
                .update_participant_seed(tournament_id, user_id, score, rank)
                .await?;
        }
        Ok(())
    }

    /// Close a round, now
    pub async fn close_round_and_advance(
        &self,
        tournament_id: TournamentId,
        round: Option<u32>,
        force: bool,
    ) -> BracketResult<RoundOutcome> {
        self.close_round_and_advance_at(tournament_id, round, force, Utc::now())
            .await
    }

    /// Resolve a round's open battles and advance its winners
    ///
    /// The round defaults to the latest one with battles. Unless `force` is
    /// set, nothing happens before the round's window has elapsed. Battle
    /// results are written in one transaction; their events are dispatched
    /// only after it commits.
    pub async fn close_round_and_advance_at(
        &self,
        tournament_id: TournamentId,
        round: Option<u32>,
        force: bool,
        now: DateTime<Utc>,
    ) -> BracketResult<RoundOutcome> {
        let mut tournament = self.load_tournament(tournament_id).await?;

        let round = match round {
            Some(0) => return Err(BracketError::InvalidRound(0)),
            Some(round) => round,
            None => self.store.max_round(tournament_id).await?.ok_or(
                BracketError::NoBattlesForRound {
                    tournament_id,
                    round: None,
                },
            )?,
        };

        if tournament.status == TournamentStatus::Completed
            && let Some(winner_id) = tournament.winner_id
        {
            // The final is the last round that has battles
            let round = self.store.max_round(tournament_id).await?.unwrap_or(round);
            return Ok(RoundOutcome::Completed { round, winner_id });
        }

        let battles = self.store.battles_for_round(tournament_id, round).await?;
        if battles.is_empty() {
            return Err(BracketError::NoBattlesForRound {
                tournament_id,
                round: Some(round),
            });
        }

        let delay = Duration::days(tournament.effective_round_delay_days());
        let round_end = battles
            .iter()
            .filter_map(|b| b.scheduled_at)
            .max()
            .map(|round_start| round_start + delay);
        if !force
            && let Some(round_end) = round_end
            && now < round_end
        {
            return Ok(RoundOutcome::NotReady {
                round,
                ready_at: round_end,
            });
        }

        let mut tx = self.store.begin().await?;
        let mut scope = self.notifier.scope();
        let settled = settle_round(tx.as_mut(), tournament_id, round, now, &mut scope).await;
        let resolved = match settled {
            Ok(resolved) => resolved,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!("Rollback of round {} failed: {}", round, rollback);
                }
                return Err(e);
            }
        };
        tx.commit().await?;
        self.notifier.flush(scope).await;

        let byes = self.store.round_byes(tournament_id, round).await?;
        let winners = compute_round_winners(&resolved, &byes);

        match winners.as_slice() {
            [] => Err(BracketError::NoWinners {
                tournament_id,
                round,
            }),
            [champion] => {
                let winner_id = *champion;
                tournament.status = TournamentStatus::Completed;
                tournament.winner_id = Some(winner_id);
                self.store.save_tournament(&tournament).await?;

                info!(
                    "Tournament {} completed after round {}, winner {}",
                    tournament_id, round, winner_id
                );

                if let Err(e) = self
                    .achievements
                    .notify(winner_id, &Achievement::tournament_won(tournament_id))
                    .await
                {
                    warn!(
                        "Achievement for user {} in tournament {} not recorded: {}",
                        winner_id, tournament_id, e
                    );
                }

                self.notifier
                    .emit(DomainEvent::RoundClosed {
                        tournament_id,
                        round,
                        winners: winners.clone(),
                        next_round: None,
                        complete: true,
                        winner_id: Some(winner_id),
                    })
                    .await;

                Ok(RoundOutcome::Completed { round, winner_id })
            }
            _ => {
                let next_round = round + 1;
                let next_at = round_end.unwrap_or(now) + delay;
                let schedule = self
                    .pairer
                    .schedule_round(&tournament, &winners, next_round, Some(next_at))
                    .await?;

                info!(
                    "Tournament {} advanced {} winners to round {}",
                    tournament_id,
                    winners.len(),
                    next_round
                );

                self.notifier
                    .emit(DomainEvent::RoundClosed {
                        tournament_id,
                        round,
                        winners: winners.clone(),
                        next_round: Some(next_round),
                        complete: false,
                        winner_id: None,
                    })
                    .await;

                Ok(RoundOutcome::Advanced {
                    round,
                    winners,
                    next_round,
                    schedule,
                })
            }
        }
    }

    /// Progress summary of a round
    pub async fn round_status(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> BracketResult<RoundStatus> {
        self.load_tournament(tournament_id).await?;
        let battles = self.store.battles_for_round(tournament_id, round).await?;
        Ok(RoundStatus::from_battles(round, &battles))
    }

    /// Start a battle, now
    pub async fn start_battle(&self, battle_id: BattleId) -> BracketResult<Battle> {
        self.start_battle_at(battle_id, Utc::now()).await
    }

    pub async fn start_battle_at(
        &self,
        battle_id: BattleId,
        now: DateTime<Utc>,
    ) -> BracketResult<Battle> {
        let timeout = self.config.battle_timeout();
        self.update_battle(battle_id, move |battle, _| battle.start(now, timeout))
            .await
    }

    /// Complete a battle, now
    pub async fn complete_battle(
        &self,
        battle_id: BattleId,
        winner: Option<UserId>,
        is_draw: bool,
    ) -> BracketResult<Battle> {
        self.complete_battle_at(battle_id, winner, is_draw, Utc::now())
            .await
    }

    /// Complete a battle with its summed points recorded
    ///
    /// Without an explicit winner the advancing player is decided from the
    /// points the same way round closure does, draws included.
    pub async fn complete_battle_at(
        &self,
        battle_id: BattleId,
        winner: Option<UserId>,
        is_draw: bool,
        now: DateTime<Utc>,
    ) -> BracketResult<Battle> {
        self.update_battle(battle_id, move |battle, points| {
            let score1 = points.get(&battle.player1_id).copied().unwrap_or(0);
            let score2 = points.get(&battle.player2_id).copied().unwrap_or(0);
            // A draw still advances one player, by the round-closure rule
            let winner = winner.unwrap_or_else(|| {
                resolve_winner(battle.player1_id, score1, battle.player2_id, score2)
            });
            battle.record_scores(score1, score2);
            battle.complete(Some(winner), is_draw, now)
        })
        .await
    }

    /// Forfeit a battle on behalf of a player, now
    pub async fn forfeit_battle(
        &self,
        battle_id: BattleId,
        player: UserId,
        reason: Option<String>,
    ) -> BracketResult<Battle> {
        self.forfeit_battle_at(battle_id, player, reason, Utc::now())
            .await
    }

    pub async fn forfeit_battle_at(
        &self,
        battle_id: BattleId,
        player: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> BracketResult<Battle> {
        self.update_battle(battle_id, move |battle, _| {
            battle.forfeit(player, reason, now)
        })
        .await
    }

    /// Cancel a battle, now
    pub async fn cancel_battle(&self, battle_id: BattleId) -> BracketResult<Battle> {
        self.cancel_battle_at(battle_id, Utc::now()).await
    }

    pub async fn cancel_battle_at(
        &self,
        battle_id: BattleId,
        now: DateTime<Utc>,
    ) -> BracketResult<Battle> {
        self.update_battle(battle_id, move |battle, _| battle.cancel(now))
            .await
    }

    /// Lock a battle, apply a transition and commit before dispatching its event
    async fn update_battle<F>(&self, battle_id: BattleId, apply: F) -> BracketResult<Battle>
    where
        F: FnOnce(&mut Battle, &HashMap<UserId, i64>) -> BracketResult<DomainEvent> + Send,
    {
        let mut tx = self.store.begin().await?;
        let mut scope = self.notifier.scope();

        let transitioned = transition(tx.as_mut(), battle_id, apply, &mut scope).await;
        let updated = match transitioned {
            Ok(battle) => battle,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!("Rollback for battle {} failed: {}", battle_id, rollback);
                }
                return Err(e);
            }
        };
        tx.commit().await?;
        self.notifier.flush(scope).await;

        Ok(updated)
    }
}

async fn transition<F>(
    tx: &mut dyn StoreTransaction,
    battle_id: BattleId,
    apply: F,
    scope: &mut EventScope,
) -> BracketResult<Battle>
where
    F: FnOnce(&mut Battle, &HashMap<UserId, i64>) -> BracketResult<DomainEvent> + Send,
{
    let mut battle = tx
        .lock_battle(battle_id)
        .await?
        .ok_or(BracketError::BattleNotFound(battle_id))?;
    let points = tx.battle_points(battle_id).await?;

    let event = apply(&mut battle, &points)?;
    tx.save_battle(&battle).await?;
    scope.push(event);

    Ok(battle)
}

/// Settle every battle of the round that has no winner yet
async fn settle_round(
    tx: &mut dyn StoreTransaction,
    tournament_id: TournamentId,
    round: u32,
    now: DateTime<Utc>,
    scope: &mut EventScope,
) -> BracketResult<Vec<Battle>> {
    let mut battles = tx.lock_round_battles(tournament_id, round).await?;

    let unresolved = |b: &Battle| !b.status.is_decided() || b.winner_id.is_none();
    for battle in battles.iter_mut().filter(|b| unresolved(b)) {
        let points = tx.battle_points(battle.id).await?;
        let score1 = points.get(&battle.player1_id).copied().unwrap_or(0);
        let score2 = points.get(&battle.player2_id).copied().unwrap_or(0);

        let event = battle.settle(score1, score2, now);
        tx.save_battle(battle).await?;
        scope.push(event);
    }

    Ok(battles)
}

fn dedup(users: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users.iter().copied().filter(|u| seen.insert(*u)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::models::{BattleStatus, Participant};
    use crate::events::{RecordingAchievementNotifier, RecordingSink};
    use crate::store::InMemoryStore;

    struct Harness {
        store: InMemoryStore,
        sink: RecordingSink,
        awards: RecordingAchievementNotifier,
        engine: BracketEngine,
    }

    fn harness(tournament: Tournament) -> Harness {
        let config = EngineConfig {
            shuffle_first_round: false,
            ..EngineConfig::default()
        };
        harness_with(tournament, config)
    }

    fn harness_with(tournament: Tournament, config: EngineConfig) -> Harness {
        let store = InMemoryStore::new();
        store.insert_tournament(tournament).unwrap();
        let sink = RecordingSink::new();
        let awards = RecordingAchievementNotifier::new();
        let engine = BracketEngine::new(
            Arc::new(store.clone()),
            EventNotifier::new(Arc::new(sink.clone())),
            Arc::new(awards.clone()),
            config,
        );
        Harness {
            store,
            sink,
            awards,
            engine,
        }
    }

    fn cup() -> Tournament {
        Tournament::new(1, "Cup").with_question_count(0)
    }

    #[tokio::test]
    async fn test_generate_rejects_unknown_tournament() {
        let h = harness(cup());
        let err = h
            .engine
            .generate_matches(99, None, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::TournamentNotFound(99)));
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_slots() {
        let h = harness(cup().with_bracket_slots(6));
        let err = h
            .engine
            .generate_matches(1, Some(&[1, 2]), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::InvalidBracketSize(6)));
    }

    #[tokio::test]
    async fn test_generate_derives_slots_and_activates() {
        let h = harness(cup());
        for user in 1..=3 {
            h.store.add_participant(Participant::new(1, user)).unwrap();
        }

        let now = Utc::now();
        let generated = h
            .engine
            .generate_matches_at(1, None, 1, None, now)
            .await
            .unwrap();
        assert_eq!(generated.bracket_slots, Some(4));
        assert_eq!(generated.schedule.battles.len(), 1);
        assert_eq!(generated.schedule.battles[0].scheduled_at, Some(now));

        let stored = h.store.get_tournament(1).await.unwrap().unwrap();
        assert_eq!(stored.status, TournamentStatus::Active);
        assert_eq!(stored.bracket_slots, Some(4));

        // Entry-order fallback still seeds, so a rerun pairs identically
        let participants = h.store.list_participants(1).await.unwrap();
        assert!(participants.iter().all(|p| p.rank.is_some()));
        let rerun = h.engine.generate_matches(1, None, 1, None).await.unwrap();
        assert!(rerun.schedule.created.is_empty());
    }

    #[tokio::test]
    async fn test_shuffled_rerun_keeps_round_one_battles() {
        for _ in 0..20 {
            let h = harness_with(cup(), EngineConfig::default());
            for user in 1..=4 {
                h.store.add_participant(Participant::new(1, user)).unwrap();
            }

            let first = h.engine.generate_matches(1, None, 1, None).await.unwrap();
            let seeds: Vec<Option<u32>> = h
                .store
                .list_participants(1)
                .await
                .unwrap()
                .iter()
                .map(|p| p.rank)
                .collect();

            let rerun = h.engine.generate_matches(1, None, 1, None).await.unwrap();
            assert!(rerun.schedule.created.is_empty());
            assert_eq!(
                rerun.selection.unwrap().selected,
                first.selection.unwrap().selected
            );
            assert_eq!(h.store.all_battles(1).unwrap().len(), 2);

            let reseeded: Vec<Option<u32>> = h
                .store
                .list_participants(1)
                .await
                .unwrap()
                .iter()
                .map(|p| p.rank)
                .collect();
            assert_eq!(reseeded, seeds);
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_completed_tournament() {
        let mut t = cup();
        t.status = TournamentStatus::Completed;
        t.winner_id = Some(1);
        let h = harness(t);
        let err = h
            .engine
            .generate_matches(1, Some(&[1, 2]), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::TournamentCompleted(1)));
    }

    #[tokio::test]
    async fn test_close_without_battles() {
        let h = harness(cup());
        let err = h
            .engine
            .close_round_and_advance(1, None, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BracketError::NoBattlesForRound { round: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_battle_transitions_emit_after_commit() {
        let h = harness(cup());
        let now = Utc::now();
        let generated = h
            .engine
            .generate_matches_at(1, Some(&[1, 2]), 1, Some(now), now)
            .await
            .unwrap();
        let battle_id = generated.schedule.battles[0].id;

        let started = h.engine.start_battle_at(battle_id, now).await.unwrap();
        assert_eq!(started.status, BattleStatus::InProgress);

        h.store.add_battle_attempt(battle_id, 1, 100, 2).unwrap();
        h.store.add_battle_attempt(battle_id, 2, 100, 5).unwrap();
        let completed = h
            .engine
            .complete_battle_at(battle_id, None, false, now + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(completed.winner_id, Some(2));
        assert_eq!(completed.player1_score, Some(2));
        assert_eq!(completed.battle_duration_secs, Some(180));

        let kinds: Vec<&str> = h.sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["battle_started", "battle_completed"]);
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_battle_untouched() {
        let h = harness(cup());
        let generated = h
            .engine
            .generate_matches(1, Some(&[1, 2]), 1, None)
            .await
            .unwrap();
        let battle_id = generated.schedule.battles[0].id;

        h.engine.cancel_battle(battle_id).await.unwrap();
        let err = h
            .engine
            .forfeit_battle(battle_id, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::InvalidBattleState { .. }));

        let stored = h.store.get_battle(battle_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BattleStatus::Cancelled);
        assert_eq!(h.sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_battle() {
        let h = harness(cup());
        let err = h.engine.start_battle(404).await.unwrap_err();
        assert!(matches!(err, BracketError::BattleNotFound(404)));
    }

    #[tokio::test]
    async fn test_final_awards_champion_once() {
        let h = harness(cup());
        let now = Utc::now();
        h.engine
            .generate_matches_at(1, Some(&[1, 2]), 1, Some(now), now)
            .await
            .unwrap();

        let outcome = h
            .engine
            .close_round_and_advance_at(1, None, true, now)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RoundOutcome::Completed {
                round: 1,
                winner_id: 1
            }
        ));
        assert_eq!(h.awards.awarded().len(), 1);

        let again = h
            .engine
            .close_round_and_advance_at(1, Some(1), true, now)
            .await
            .unwrap();
        assert!(matches!(again, RoundOutcome::Completed { winner_id: 1, .. }));
        assert_eq!(h.awards.awarded().len(), 1);
    }

    #[tokio::test]
    async fn test_recheck_reports_deciding_round() {
        let h = harness(cup());
        let now = Utc::now();
        h.engine
            .generate_matches_at(1, Some(&[1, 2, 3, 4]), 1, Some(now), now)
            .await
            .unwrap();
        h.engine
            .close_round_and_advance_at(1, None, true, now)
            .await
            .unwrap();
        h.engine
            .close_round_and_advance_at(1, Some(2), true, now)
            .await
            .unwrap();

        let again = h
            .engine
            .close_round_and_advance_at(1, Some(1), true, now)
            .await
            .unwrap();
        assert!(matches!(
            again,
            RoundOutcome::Completed {
                round: 2,
                winner_id: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_draw_in_opening_round_advances_lower_id() {
        let h = harness(cup());
        let now = Utc::now();
        let generated = h
            .engine
            .generate_matches_at(1, Some(&[1, 2, 3, 4]), 1, Some(now), now)
            .await
            .unwrap();
        let drawn = generated.schedule.battles[0].clone();
        assert_eq!((drawn.player1_id, drawn.player2_id), (1, 4));

        let completed = h
            .engine
            .complete_battle_at(drawn.id, None, true, now)
            .await
            .unwrap();
        assert!(completed.is_draw);
        assert_eq!(completed.winner_id, Some(1));

        let outcome = h
            .engine
            .close_round_and_advance_at(1, None, true, now)
            .await
            .unwrap();
        match outcome {
            RoundOutcome::Advanced {
                winners,
                next_round,
                ..
            } => {
                assert_eq!(winners, vec![1, 2]);
                assert_eq!(next_round, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(h.awards.awarded().is_empty());
    }

    #[tokio::test]
    async fn test_drawn_final_still_crowns_champion() {
        let h = harness(cup());
        let now = Utc::now();
        let generated = h
            .engine
            .generate_matches_at(1, Some(&[5, 3]), 1, Some(now), now)
            .await
            .unwrap();
        let battle_id = generated.schedule.battles[0].id;
        h.store.add_battle_attempt(battle_id, 5, 1, 4).unwrap();
        h.store.add_battle_attempt(battle_id, 3, 1, 4).unwrap();

        h.engine
            .complete_battle_at(battle_id, None, true, now)
            .await
            .unwrap();
        let outcome = h
            .engine
            .close_round_and_advance_at(1, None, true, now)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            RoundOutcome::Completed {
                round: 1,
                winner_id: 3
            }
        ));
        assert_eq!(h.awards.awarded().len(), 1);
    }

    #[tokio::test]
    async fn test_close_settles_completed_battle_without_winner() {
        let h = harness(cup());
        let now = Utc::now();
        let generated = h
            .engine
            .generate_matches_at(1, Some(&[1, 2]), 1, Some(now), now)
            .await
            .unwrap();
        let mut battle = generated.schedule.battles[0].clone();
        battle.complete(None, true, now).unwrap();
        h.store.save_battle(&battle).await.unwrap();

        let outcome = h
            .engine
            .close_round_and_advance_at(1, None, true, now)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RoundOutcome::Completed {
                round: 1,
                winner_id: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_achievement_failure_does_not_fail_completion() {
        let h = harness(cup());
        h.awards.set_failing(true);
        h.engine
            .generate_matches(1, Some(&[4, 9]), 1, None)
            .await
            .unwrap();

        let outcome = h
            .engine
            .close_round_and_advance(1, None, true)
            .await
            .unwrap();
        assert_eq!(outcome.label(), "completed");
        let stored = h.store.get_tournament(1).await.unwrap().unwrap();
        assert_eq!(stored.winner_id, Some(4));
    }

    #[tokio::test]
    async fn test_round_status_reports_progress() {
        let h = harness(cup());
        let generated = h
            .engine
            .generate_matches(1, Some(&[1, 2, 3, 4]), 1, None)
            .await
            .unwrap();
        h.engine
            .forfeit_battle(generated.schedule.battles[0].id, 1, None)
            .await
            .unwrap();

        let status = h.engine.round_status(1, 1).await.unwrap();
        assert_eq!(status.total, 2);
        assert_eq!(status.completed, 1);
        assert_eq!(status.pending, 1);
        assert!(!status.is_complete);
    }
}
