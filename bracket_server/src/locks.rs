//! Per-tournament serialization of mutating engine calls.

use bracket_engine::bracket::TournamentId;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Lock map shared by HTTP handlers and the scheduler
///
/// Each tournament gets its own mutex, so closing a round in one tournament
/// never waits on another.
#[derive(Clone, Default)]
pub struct TournamentLocks {
    locks: Arc<RwLock<HashMap<TournamentId, Arc<Mutex<()>>>>>,
}

impl TournamentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a tournament
    pub async fn acquire(&self, tournament_id: TournamentId) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(&tournament_id).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .locks
                .write()
                .await
                .entry(tournament_id)
                .or_default()
                .clone(),
        };
        lock.lock_owned().await
    }

    /// Exclusive access if nobody holds the tournament right now
    pub async fn try_acquire(&self, tournament_id: TournamentId) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .write()
            .await
            .entry(tournament_id)
            .or_default()
            .clone();
        lock.try_lock_owned().ok()
    }

    /// Number of tournaments that have been locked at least once
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
