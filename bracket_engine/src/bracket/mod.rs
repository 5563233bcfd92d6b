//! Single-elimination bracket: selection, pairing, battles and round advancement.

pub mod battle;
pub mod engine;
pub mod errors;
pub mod models;
pub mod pairing;
pub mod qualifier;
pub mod questions;
pub mod resolution;

pub use engine::{BracketEngine, GeneratedMatches, RoundOutcome};
pub use errors::{BracketError, BracketResult};
pub use models::{
    Battle, BattleAttempt, BattleId, BattleQuestion, BattleStatus, NewBattle, Participant,
    ParticipantStatus, QualificationAttempt, QualifierTieBreaker, Question, QuestionId,
    RoundStatus, Tournament, TournamentId, TournamentStatus, UserId,
};
pub use pairing::{BracketPairer, Pairing, RoundSchedule, fold_pairs, seed_order};
pub use qualifier::{
    QualifierFallback, QualifierSelector, Selection, calculate_optimal_bracket_size,
    is_valid_bracket_size,
};
pub use questions::{AttachOutcome, AttachWarning, QuestionAttacher, compose_question_set};
pub use resolution::{compute_round_winners, resolve_winner};
