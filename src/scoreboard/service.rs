//! The process-wide scoreboard shared by all sessions.

use crate::scoreboard::models::DATE_FORMAT;
use crate::scoreboard::{HistoryEntry, JsonStore, ScoreEntry, Standings, StoreError};
use crate::sink::{MatchResult, ResultSink};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, instrument};

/// Serialized owner of the standings.
///
/// One mutex guards both the score table and the history, so concurrent
/// sessions finishing at the same time cannot lose updates. With autosave
/// on, each recorded result is written through to the [`JsonStore`] while
/// the lock is held, keeping file contents in record order.
#[derive(Debug)]
pub struct Scoreboard {
    standings: Mutex<Standings>,
    store: Option<JsonStore>,
    autosave: bool,
}

impl Scoreboard {
    /// Creates a scoreboard that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            standings: Mutex::new(Standings::default()),
            store: None,
            autosave: false,
        }
    }

    /// Loads standings from `store` and keeps it for later flushes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the existing files cannot be read.
    #[instrument(skip(store), fields(dir = %store.dir().display()))]
    pub fn open(store: JsonStore, autosave: bool) -> Result<Self, StoreError> {
        let standings = store.load()?;
        info!(autosave, "Scoreboard opened");
        Ok(Self {
            standings: Mutex::new(standings),
            store: Some(store),
            autosave,
        })
    }

    /// Records a result with an explicit timestamp.
    #[instrument(skip(self))]
    pub fn record_at(&self, result: MatchResult, date: String) {
        let mut standings = self.lock();
        standings.apply(&result, date);
        if self.autosave {
            if let Some(store) = &self.store {
                if let Err(err) = store.save(&standings) {
                    error!(error = %err, "Failed to persist standings");
                }
            }
        }
    }

    /// Scores ordered best first.
    pub fn scores(&self) -> Vec<ScoreEntry> {
        self.lock().ranked()
    }

    /// Match history, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().recent_first()
    }

    /// Current score for `nickname`.
    pub fn score_of(&self, nickname: &str) -> Option<i64> {
        self.lock().score_of(nickname)
    }

    /// Copy of the current standings.
    pub fn snapshot(&self) -> Standings {
        self.lock().clone()
    }

    /// Writes the standings to the store, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if writing fails.
    #[instrument(skip(self))]
    pub fn flush(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.save(&self.lock()),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Standings> {
        self.standings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultSink for Scoreboard {
    fn record(&self, result: MatchResult) {
        let date = chrono::Local::now().format(DATE_FORMAT).to_string();
        self.record_at(result, date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn win(winner: &str, loser: &str) -> MatchResult {
        MatchResult::Win {
            winner: winner.to_string(),
            loser: loser.to_string(),
        }
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let scoreboard = Arc::new(Scoreboard::in_memory());
        let wins = 40;
        let losses = 25;

        std::thread::scope(|scope| {
            for i in 0..wins {
                let scoreboard = Arc::clone(&scoreboard);
                scope.spawn(move || scoreboard.record(win("alice", &format!("rival{}", i % 4))));
            }
            for i in 0..losses {
                let scoreboard = Arc::clone(&scoreboard);
                scope.spawn(move || scoreboard.record(win(&format!("rival{}", i % 4), "alice")));
            }
        });

        assert_eq!(scoreboard.score_of("alice"), Some(wins - losses));
        assert_eq!(scoreboard.history().len(), (wins + losses) as usize);
        let alice_entries = scoreboard
            .scores()
            .iter()
            .filter(|e| e.nickname() == "alice")
            .count();
        assert_eq!(alice_entries, 1);
    }

    #[test]
    fn test_autosave_writes_through() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let scoreboard =
            Scoreboard::open(JsonStore::new(dir.path()), true).expect("Open failed");
        scoreboard.record(win("alice", "bob"));

        let reopened = JsonStore::new(dir.path()).load().expect("Reload failed");
        assert_eq!(reopened.score_of("alice"), Some(1));
    }

    #[test]
    fn test_without_autosave_only_flush_writes() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let scoreboard =
            Scoreboard::open(JsonStore::new(dir.path()), false).expect("Open failed");
        scoreboard.record(win("alice", "bob"));

        let store = JsonStore::new(dir.path());
        assert_eq!(store.load().expect("Reload failed").score_of("alice"), None);

        scoreboard.flush().expect("Flush failed");
        assert_eq!(store.load().expect("Reload failed").score_of("alice"), Some(1));
    }

    #[test]
    fn test_persistence_failure_does_not_propagate() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let scoreboard =
            Scoreboard::open(JsonStore::new(dir.path()), true).expect("Open failed");
        // Replace the history file with a directory so the rename fails.
        std::fs::remove_file(dir.path().join("history.json")).unwrap();
        std::fs::create_dir(dir.path().join("history.json")).unwrap();

        scoreboard.record(win("alice", "bob"));
        assert_eq!(scoreboard.score_of("alice"), Some(1));
    }
}
