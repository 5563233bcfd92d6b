//! Achievement notifications sent when a tournament is decided.

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::bracket::models::{TournamentId, UserId};

/// Achievement type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    TournamentWon,
}

/// Achievement payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub tournament_id: TournamentId,
    pub rank: u32,
}

impl Achievement {
    /// Champion of a tournament
    pub fn tournament_won(tournament_id: TournamentId) -> Self {
        Self {
            kind: AchievementKind::TournamentWon,
            tournament_id,
            rank: 1,
        }
    }
}

/// Achievement delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Achievement service unavailable: {0}")]
    Unavailable(String),

    #[error("Achievement rejected: {0}")]
    Rejected(String),
}

/// Awards achievements and points to users
#[async_trait]
pub trait AchievementNotifier: Send + Sync {
    async fn notify(&self, user_id: UserId, achievement: &Achievement) -> Result<(), NotifyError>;
}

/// Logs awarded achievements
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAchievementNotifier;

#[async_trait]
impl AchievementNotifier for LogAchievementNotifier {
    async fn notify(&self, user_id: UserId, achievement: &Achievement) -> Result<(), NotifyError> {
        info!(
            "User {} earned {:?} in tournament {} (rank {})",
            user_id, achievement.kind, achievement.tournament_id, achievement.rank
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Awards {
    awarded: Vec<(UserId, Achievement)>,
    failing: bool,
}

/// Keeps awarded achievements in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingAchievementNotifier {
    inner: Arc<Mutex<Awards>>,
}

impl RecordingAchievementNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every notification while set
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    /// Achievements awarded so far
    pub fn awarded(&self) -> Vec<(UserId, Achievement)> {
        self.inner
            .lock()
            .map(|inner| inner.awarded.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AchievementNotifier for RecordingAchievementNotifier {
    async fn notify(&self, user_id: UserId, achievement: &Achievement) -> Result<(), NotifyError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NotifyError::Unavailable("recorder poisoned".to_string()))?;
        if inner.failing {
            return Err(NotifyError::Unavailable("injected failure".to_string()));
        }
        inner.awarded.push((user_id, achievement.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_achievement_payload_shape() {
        let json = serde_json::to_value(Achievement::tournament_won(12)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "tournament_won", "tournament_id": 12, "rank": 1})
        );
    }

    #[tokio::test]
    async fn test_recording_notifier_failure_toggle() {
        let notifier = RecordingAchievementNotifier::new();
        notifier.set_failing(true);
        assert!(notifier.notify(1, &Achievement::tournament_won(1)).await.is_err());
        notifier.set_failing(false);
        notifier.notify(1, &Achievement::tournament_won(1)).await.unwrap();
        assert_eq!(notifier.awarded().len(), 1);
    }
}
