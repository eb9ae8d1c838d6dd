//! Registry of sessions currently in progress.

use crate::session::SessionId;
use chrono::{DateTime, Local};
use derive_getters::Getters;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// A match the server is currently coordinating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct ActiveMatch {
    id: SessionId,
    player_x: String,
    player_o: String,
    started_at: DateTime<Local>,
}

/// Shared map of live sessions.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, ActiveMatch>>>,
    sequence: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next match number, starting at 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registers a session. The entry lives as long as the returned guard.
    #[instrument(skip(self))]
    pub fn register(&self, id: SessionId, player_x: &str, player_o: &str) -> Registration {
        let entry = ActiveMatch {
            id: id.clone(),
            player_x: player_x.to_string(),
            player_o: player_o.to_string(),
            started_at: Local::now(),
        };
        let count = {
            let mut sessions = self.lock();
            sessions.insert(id.clone(), entry);
            sessions.len()
        };
        info!(active = count, "Session registered");
        Registration {
            registry: self.clone(),
            id,
        }
    }

    /// Snapshot of live sessions, oldest first.
    pub fn active(&self) -> Vec<ActiveMatch> {
        let mut matches: Vec<ActiveMatch> = self.lock().values().cloned().collect();
        matches.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no session is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove(&self, id: &str) {
        let removed = self.lock().remove(id);
        debug!(session_id = %id, removed = removed.is_some(), "Session unregistered");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ActiveMatch>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a session listed in the registry until dropped.
#[derive(Debug)]
pub struct Registration {
    registry: SessionRegistry,
    id: SessionId,
}

impl Registration {
    /// Identifier of the registered session.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
