//! Qualifier selection and bracket sizing.

use log::{info, warn};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::models::{QualificationAttempt, QualifierTieBreaker, Tournament, UserId};
use crate::store::BracketStore;

/// Largest supported bracket
pub const MAX_BRACKET_SIZE: u32 = 32;

/// Why selection fell back to plain truncation of the input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualifierFallback {
    /// None of the candidates made a qualification attempt
    NoAttempts,
    /// Attempts could not be read
    StorageError(String),
}

/// Outcome of qualifier selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Entrants in seed order (best first)
    pub selected: Vec<UserId>,
    /// Candidates that did not make the bracket, in input order
    pub excluded: Vec<UserId>,
    /// Best qualification score of each selected entrant
    pub best_scores: HashMap<UserId, i64>,
    /// Set when attempts were not used for ranking
    pub fallback: Option<QualifierFallback>,
}

impl Selection {
    /// Whether entrants were ranked by their attempts
    pub fn is_ranked(&self) -> bool {
        self.fallback.is_none()
    }
}

/// Chooses which candidates fill the bracket slots
#[derive(Clone)]
pub struct QualifierSelector {
    store: Arc<dyn BracketStore>,
}

impl QualifierSelector {
    /// Create a selector reading attempts from the given store
    pub fn new(store: Arc<dyn BracketStore>) -> Self {
        Self { store }
    }

    /// Pick up to `slots` entrants from `candidates`
    ///
    /// Candidates are ranked by their best qualification attempt. When no
    /// candidate has an attempt, or attempts cannot be read, the first
    /// `slots` candidates are taken in input order.
    pub async fn select(
        &self,
        tournament: &Tournament,
        slots: usize,
        candidates: &[UserId],
    ) -> Selection {
        let candidates = dedup(candidates);

        let attempts = match self
            .store
            .qualification_attempts(tournament.id, &candidates)
            .await
        {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(
                    "Reading qualification attempts for tournament {} failed, using entry order: {}",
                    tournament.id, e
                );
                return truncate(
                    &candidates,
                    slots,
                    QualifierFallback::StorageError(e.to_string()),
                );
            }
        };

        if attempts.is_empty() {
            return truncate(&candidates, slots, QualifierFallback::NoAttempts);
        }

        let ranked = rank_attempts(&attempts, tournament.qualifier_tie_breaker);
        let best_scores: HashMap<UserId, i64> = ranked.iter().take(slots).copied().collect();
        let selected: Vec<UserId> = ranked.iter().take(slots).map(|(user, _)| *user).collect();
        let excluded = candidates
            .iter()
            .copied()
            .filter(|user| !best_scores.contains_key(user))
            .collect();

        info!(
            "Selected {} of {} candidates for tournament {}",
            selected.len(),
            candidates.len(),
            tournament.id
        );

        Selection {
            selected,
            excluded,
            best_scores,
            fallback: None,
        }
    }
}

/// Each user's best attempt, best users first
///
/// Attempts are ordered by score descending, then by the tie breaker
/// ascending, then by attempt id.
pub fn rank_attempts(
    attempts: &[QualificationAttempt],
    tie_breaker: QualifierTieBreaker,
) -> Vec<(UserId, i64)> {
    let mut ordered: Vec<&QualificationAttempt> = attempts.iter().collect();
    ordered.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| tie_break(a, b, tie_breaker))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter(|attempt| seen.insert(attempt.user_id))
        .map(|attempt| (attempt.user_id, attempt.score))
        .collect()
}

fn tie_break(
    a: &QualificationAttempt,
    b: &QualificationAttempt,
    tie_breaker: QualifierTieBreaker,
) -> Ordering {
    match tie_breaker {
        QualifierTieBreaker::Duration => a.duration_secs.cmp(&b.duration_secs),
        QualifierTieBreaker::SubmittedAt => a.submitted_at.cmp(&b.submitted_at),
    }
}

fn truncate(candidates: &[UserId], slots: usize, fallback: QualifierFallback) -> Selection {
    let cut = slots.min(candidates.len());
    Selection {
        selected: candidates[..cut].to_vec(),
        excluded: candidates[cut..].to_vec(),
        best_scores: HashMap::new(),
        fallback: Some(fallback),
    }
}

fn dedup(users: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users.iter().copied().filter(|u| seen.insert(*u)).collect()
}

/// Smallest supported bracket holding `count` entrants
pub fn calculate_optimal_bracket_size(count: usize) -> u32 {
    match count {
        0..=4 => 4,
        5..=8 => 8,
        9..=16 => 16,
        _ => MAX_BRACKET_SIZE,
    }
}

/// Whether a configured bracket size is a power of two in 2..=32
pub fn is_valid_bracket_size(size: u32) -> bool {
    (2..=MAX_BRACKET_SIZE).contains(&size) && size.is_power_of_two()
}
