//! Bracket pairing: seeding, fold pairing and idempotent battle scheduling.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::errors::{BracketError, BracketResult};
use super::models::{Battle, BattleId, NewBattle, Tournament, UserId};
use super::questions::{AttachWarning, QuestionAttacher};
use crate::store::{BracketStore, StoreError};

/// Pairs for one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// Canonical `(lower id, higher id)` pairs
    pub pairs: Vec<(UserId, UserId)>,
    /// Middle entrant of an odd-sized field
    pub bye: Option<UserId>,
}

/// Pair the first entrant with the last, the second with the second to last
/// and so on
pub fn fold_pairs(entrants: &[UserId]) -> Pairing {
    let n = entrants.len();
    let pairs = (0..n / 2)
        .map(|i| {
            let (a, b) = (entrants[i], entrants[n - 1 - i]);
            (a.min(b), a.max(b))
        })
        .collect();
    let bye = (n % 2 == 1).then(|| entrants[n / 2]);

    Pairing { pairs, bye }
}

/// Stable-sort entrants by seed rank, unseeded entrants last
///
/// Input order is kept when nobody is seeded.
pub fn seed_order(entrants: &[UserId], ranks: &HashMap<UserId, u32>) -> Vec<UserId> {
    let mut ordered = entrants.to_vec();
    if entrants.iter().any(|user| ranks.contains_key(user)) {
        ordered.sort_by_key(|user| ranks.get(user).copied().unwrap_or(u32::MAX));
    }
    ordered
}

fn dedup(users: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users.iter().copied().filter(|u| seen.insert(*u)).collect()
}

/// Battles scheduled for a round
#[derive(Debug, Clone, Default)]
pub struct RoundSchedule {
    pub round: u32,
    /// Every battle of the pairing, found or created, in pairing order
    pub battles: Vec<Battle>,
    /// Battles inserted by this call
    pub created: Vec<BattleId>,
    pub bye: Option<UserId>,
    /// Question attachment problems on created battles
    pub warnings: Vec<AttachWarning>,
}

/// Schedules rounds against the store
#[derive(Clone)]
pub struct BracketPairer {
    store: Arc<dyn BracketStore>,
    attacher: QuestionAttacher,
}

impl BracketPairer {
    pub fn new(store: Arc<dyn BracketStore>) -> Self {
        Self {
            attacher: QuestionAttacher::new(store.clone()),
            store,
        }
    }

    /// Pair `participants` for `round`, reusing battles that already exist
    pub async fn schedule_round(
        &self,
        tournament: &Tournament,
        participants: &[UserId],
        round: u32,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> BracketResult<RoundSchedule> {
        if round == 0 {
            return Err(BracketError::InvalidRound(round));
        }

        let entrants = dedup(participants);
        if entrants.len() < 2 {
            return Err(BracketError::NotEnoughParticipants {
                count: entrants.len(),
            });
        }

        let ranks: HashMap<UserId, u32> = self
            .store
            .list_participants(tournament.id)
            .await?
            .into_iter()
            .filter_map(|p| p.rank.map(|rank| (p.user_id, rank)))
            .collect();
        let pairing = fold_pairs(&seed_order(&entrants, &ranks));

        let mut schedule = RoundSchedule {
            round,
            bye: pairing.bye,
            ..RoundSchedule::default()
        };

        for (player1, player2) in pairing.pairs {
            let new_battle =
                NewBattle::canonical(tournament.id, round, player1, player2, scheduled_at);
            let (battle, created) = self.find_or_insert(&new_battle).await?;

            if created {
                schedule.created.push(battle.id);
                // On-create pipeline
                if let Err(warning) = self.attacher.attach(tournament, battle.id).await {
                    warn!("{}", warning);
                    schedule.warnings.push(warning);
                }
            }
            schedule.battles.push(battle);
        }

        if let Some(user) = pairing.bye {
            self.store.record_bye(tournament.id, round, user).await?;
            debug!(
                "User {} receives a bye in round {} of tournament {}",
                user, round, tournament.id
            );
        }

        info!(
            "Round {} of tournament {}: {} battles ({} new)",
            round,
            tournament.id,
            schedule.battles.len(),
            schedule.created.len()
        );

        Ok(schedule)
    }

    async fn find_or_insert(&self, new_battle: &NewBattle) -> BracketResult<(Battle, bool)> {
        if let Some(mut existing) = self
            .store
            .find_battle(
                new_battle.tournament_id,
                new_battle.round,
                new_battle.player1_id,
                new_battle.player2_id,
            )
            .await?
        {
            if existing.scheduled_at.is_none() && new_battle.scheduled_at.is_some() {
                existing.scheduled_at = new_battle.scheduled_at;
                self.store.save_battle(&existing).await?;
            }
            return Ok((existing, false));
        }

        match self.store.insert_battle(new_battle).await {
            Ok(battle) => Ok((battle, true)),
            Err(StoreError::Conflict(_)) => {
                // Lost a race with a concurrent scheduler
                let battle = self
                    .store
                    .find_battle(
                        new_battle.tournament_id,
                        new_battle.round,
                        new_battle.player1_id,
                        new_battle.player2_id,
                    )
                    .await?
                    .ok_or_else(|| {
                        StoreError::NotFound(format!(
                            "battle ({}, {}, {}, {}) after conflict",
                            new_battle.tournament_id,
                            new_battle.round,
                            new_battle.player1_id,
                            new_battle.player2_id
                        ))
                    })?;
                Ok((battle, false))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::models::{BattleStatus, Participant};
    use crate::store::{FailurePoint, InMemoryStore};
    use chrono::Duration;

    #[test]
    fn test_fold_pairs_even() {
        let pairing = fold_pairs(&[1, 2, 3, 4]);
        assert_eq!(pairing.pairs, vec![(1, 4), (2, 3)]);
        assert_eq!(pairing.bye, None);
    }

    #[test]
    fn test_fold_pairs_odd_gives_middle_a_bye() {
        let pairing = fold_pairs(&[10, 20, 30, 40, 50]);
        assert_eq!(pairing.pairs, vec![(10, 50), (20, 40)]);
        assert_eq!(pairing.bye, Some(30));
    }

    #[test]
    fn test_fold_pairs_are_canonical() {
        let pairing = fold_pairs(&[9, 7, 5, 3]);
        assert_eq!(pairing.pairs, vec![(3, 9), (5, 7)]);
    }

    #[test]
    fn test_seed_order_puts_unseeded_last() {
        let ranks = HashMap::from([(30, 1), (10, 2)]);
        assert_eq!(seed_order(&[10, 20, 30, 40], &ranks), vec![30, 10, 20, 40]);
    }

    #[test]
    fn test_seed_order_keeps_input_without_seeds() {
        assert_eq!(seed_order(&[4, 1, 3], &HashMap::new()), vec![4, 1, 3]);
    }

    fn setup() -> (InMemoryStore, BracketPairer, Tournament) {
        let store = InMemoryStore::new();
        let tournament = Tournament::new(1, "Cup").with_question_count(0);
        store.insert_tournament(tournament.clone()).unwrap();
        let pairer = BracketPairer::new(Arc::new(store.clone()));
        (store, pairer, tournament)
    }

    #[tokio::test]
    async fn test_schedule_is_idempotent() {
        let (store, pairer, tournament) = setup();
        let at = Utc::now();

        let first = pairer
            .schedule_round(&tournament, &[1, 2, 3, 4], 1, Some(at))
            .await
            .unwrap();
        assert_eq!(first.created.len(), 2);

        let second = pairer
            .schedule_round(&tournament, &[1, 2, 3, 4], 1, Some(at + Duration::days(1)))
            .await
            .unwrap();
        assert!(second.created.is_empty());
        assert_eq!(store.all_battles(1).unwrap().len(), 2);

        // An existing schedule is not moved
        for battle in &second.battles {
            assert_eq!(battle.scheduled_at, Some(at));
        }
    }

    #[tokio::test]
    async fn test_unset_schedule_is_filled_in() {
        let (store, pairer, tournament) = setup();
        pairer
            .schedule_round(&tournament, &[1, 2], 1, None)
            .await
            .unwrap();

        let at = Utc::now();
        let again = pairer
            .schedule_round(&tournament, &[1, 2], 1, Some(at))
            .await
            .unwrap();
        assert_eq!(again.battles[0].scheduled_at, Some(at));
        assert_eq!(store.all_battles(1).unwrap()[0].scheduled_at, Some(at));
    }

    #[tokio::test]
    async fn test_duplicates_are_ignored() {
        let (store, pairer, tournament) = setup();
        let schedule = pairer
            .schedule_round(&tournament, &[1, 2, 2, 1, 3], 1, None)
            .await
            .unwrap();

        assert_eq!(schedule.battles.len(), 1);
        assert_eq!(schedule.bye, Some(2));
        assert_eq!(store.round_byes(1, 1).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_too_few_participants() {
        let (_, pairer, tournament) = setup();
        let err = pairer
            .schedule_round(&tournament, &[5, 5], 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::NotEnoughParticipants { count: 1 }));
    }

    #[tokio::test]
    async fn test_round_zero_rejected() {
        let (_, pairer, tournament) = setup();
        let err = pairer
            .schedule_round(&tournament, &[1, 2], 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::InvalidRound(0)));
    }

    #[tokio::test]
    async fn test_seeds_drive_pairing() {
        let (store, pairer, tournament) = setup();
        for (user, rank) in [(1, 4), (2, 3), (3, 2), (4, 1)] {
            store
                .add_participant(Participant::new(1, user).with_rank(rank))
                .unwrap();
        }

        let schedule = pairer
            .schedule_round(&tournament, &[1, 2, 3, 4], 1, None)
            .await
            .unwrap();
        let pairs: Vec<(UserId, UserId)> = schedule
            .battles
            .iter()
            .map(|b| (b.player1_id, b.player2_id))
            .collect();
        // Seed order 4, 3, 2, 1 folds to (4 v 1) and (3 v 2)
        assert_eq!(pairs, vec![(1, 4), (2, 3)]);
    }

    #[tokio::test]
    async fn test_attach_failure_does_not_fail_scheduling() {
        let store = InMemoryStore::new();
        let tournament = Tournament::new(1, "Cup").with_question_count(5);
        store.insert_tournament(tournament.clone()).unwrap();
        store.fail_on(FailurePoint::QuestionReads);
        let pairer = BracketPairer::new(Arc::new(store.clone()));

        let schedule = pairer
            .schedule_round(&tournament, &[1, 2, 3, 4], 1, None)
            .await
            .unwrap();
        assert_eq!(schedule.created.len(), 2);
        assert_eq!(schedule.warnings.len(), 2);
        assert!(
            schedule
                .battles
                .iter()
                .all(|b| b.status == BattleStatus::Scheduled)
        );
    }

    #[tokio::test]
    async fn test_insert_failure_propagates() {
        let (store, pairer, tournament) = setup();
        store.fail_on(FailurePoint::BattleInserts);
        let err = pairer
            .schedule_round(&tournament, &[1, 2], 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::Store(_)));
    }
}
