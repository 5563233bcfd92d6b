//! Attaching questions to newly created battles.

use log::{debug, warn};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::models::{BattleId, BattleQuestion, QuestionId, Tournament};
use crate::store::BracketStore;

/// Question attachment failed; the battle itself is unaffected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachWarning {
    pub battle_id: BattleId,
    pub reason: String,
}

impl fmt::Display for AttachWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not attach questions to battle {}: {}",
            self.battle_id, self.reason
        )
    }
}

/// What the attacher did for a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Questions were attached at positions 1..=count
    Attached { count: usize },
    /// The battle already had questions
    AlreadyAttached,
    /// Neither the pool nor the topic offered any question
    NoQuestions,
}

/// Fills new battles with questions from the tournament pool
#[derive(Clone)]
pub struct QuestionAttacher {
    store: Arc<dyn BracketStore>,
}

impl QuestionAttacher {
    pub fn new(store: Arc<dyn BracketStore>) -> Self {
        Self { store }
    }

    /// Attach questions to a battle that has none
    pub async fn attach(
        &self,
        tournament: &Tournament,
        battle_id: BattleId,
    ) -> Result<AttachOutcome, AttachWarning> {
        let warning = |reason: String| AttachWarning { battle_id, reason };

        let existing = self
            .store
            .battle_question_ids(battle_id)
            .await
            .map_err(|e| warning(e.to_string()))?;
        if !existing.is_empty() {
            return Ok(AttachOutcome::AlreadyAttached);
        }

        let target = tournament.battle_question_count as usize;
        if target == 0 {
            return Ok(AttachOutcome::NoQuestions);
        }

        let pool = self
            .store
            .question_pool(tournament.id)
            .await
            .map_err(|e| warning(e.to_string()))?;

        let distinct_pool = pool.iter().collect::<HashSet<_>>().len();
        let topic_questions = match &tournament.topic {
            Some(topic) if distinct_pool < target => self
                .store
                .topic_questions(topic)
                .await
                .map_err(|e| warning(e.to_string()))?,
            _ => Vec::new(),
        };

        let chosen = {
            let mut rng = rand::rng();
            compose_question_set(&pool, &topic_questions, target, &mut rng)
        };
        if chosen.is_empty() {
            debug!("No questions available for battle {}", battle_id);
            return Ok(AttachOutcome::NoQuestions);
        }

        let rows: Vec<BattleQuestion> = chosen
            .iter()
            .zip(1u32..)
            .map(|(&question_id, position)| BattleQuestion {
                battle_id,
                question_id,
                position,
            })
            .collect();

        self.store
            .attach_questions(&rows)
            .await
            .map_err(|e| warning(e.to_string()))?;

        if rows.len() < target {
            warn!(
                "Battle {} received {} of {} questions",
                battle_id,
                rows.len(),
                target
            );
        }

        Ok(AttachOutcome::Attached { count: rows.len() })
    }
}

/// Choose up to `target` questions for one battle
///
/// The curated pool is taken in order first. A shortfall is backfilled by
/// sampling topic questions that were not already chosen. The result is
/// shuffled.
pub fn compose_question_set<R: Rng + ?Sized>(
    pool: &[QuestionId],
    topic: &[QuestionId],
    target: usize,
    rng: &mut R,
) -> Vec<QuestionId> {
    let mut seen = HashSet::new();
    let mut chosen: Vec<QuestionId> = pool
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .take(target)
        .collect();

    if chosen.len() < target {
        let remaining: Vec<QuestionId> = topic
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        let needed = target - chosen.len();
        chosen.extend(remaining.choose_multiple(rng, needed).copied());
    }

    chosen.shuffle(rng);
    chosen.truncate(target);
    chosen
}
