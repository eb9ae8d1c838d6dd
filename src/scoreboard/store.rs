//! On-disk JSON persistence for the standings.

use crate::scoreboard::{HistoryEntry, ScoreEntry, Standings, StoreError};
use derive_getters::Getters;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const SCOREBOARD_FILE: &str = "scoreboard.json";
const HISTORY_FILE: &str = "history.json";

/// Reads and writes `scoreboard.json` and `history.json` in one directory.
#[derive(Debug, Clone, Getters)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Creates a store rooted at `dir`. Nothing is touched until [`load`](Self::load).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the score table file.
    pub fn scoreboard_path(&self) -> PathBuf {
        self.dir.join(SCOREBOARD_FILE)
    }

    /// Path of the history file.
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Loads both files, creating them as empty arrays when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a file cannot be created, read, or parsed.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn load(&self) -> Result<Standings, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let scores: Vec<ScoreEntry> = read_or_init(&self.scoreboard_path())?;
        let history: Vec<HistoryEntry> = read_or_init(&self.history_path())?;
        info!(
            players = scores.len(),
            matches = history.len(),
            "Standings loaded"
        );
        Ok(Standings::from_records(scores, history))
    }

    /// Writes both files.
    ///
    /// Each file is written to a temporary sibling first and then renamed
    /// over the existing file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or any file operation fails.
    #[instrument(skip(self, standings), fields(dir = %self.dir.display()))]
    pub fn save(&self, standings: &Standings) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.scoreboard_path(), standings.scores())?;
        write_atomic(&self.history_path(), standings.history())?;
        debug!(
            players = standings.scores().len(),
            matches = standings.history().len(),
            "Standings saved"
        );
        Ok(())
    }
}

fn read_or_init<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        info!(path = %path.display(), "Creating empty record file");
        fs::write(path, "[]")?;
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| StoreError::new(format!("Failed to parse '{}': {}", path.display(), e)))
}

fn write_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MatchResult;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_empty_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonStore::new(dir.path());

        let standings = store.load().expect("Load failed");
        assert_eq!(standings, Standings::default());
        assert_eq!(fs::read_to_string(store.scoreboard_path()).unwrap(), "[]");
        assert_eq!(fs::read_to_string(store.history_path()).unwrap(), "[]");
    }

    #[test]
    fn test_save_then_load_keeps_standings() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonStore::new(dir.path());

        let mut standings = Standings::default();
        standings.apply(
            &MatchResult::Win {
                winner: "alice".to_string(),
                loser: "bob".to_string(),
            },
            "2024-03-01 12:00:00".to_string(),
        );
        store.save(&standings).expect("Save failed");

        assert_eq!(store.load().expect("Reload failed"), standings);
    }

    #[test]
    fn test_reads_legacy_scoreboard_layout() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonStore::new(dir.path());
        fs::write(
            store.scoreboard_path(),
            r#"[{"nickname": "alice", "score": 4}, {"nickname": "bob", "score": -2}]"#,
        )
        .unwrap();
        fs::write(
            store.history_path(),
            r#"[{"nicknames": "alice-bob", "winner": "alice", "date": "2024-01-01 08:00:00"}]"#,
        )
        .unwrap();

        let standings = store.load().expect("Load failed");
        assert_eq!(standings.score_of("alice"), Some(4));
        assert_eq!(standings.score_of("bob"), Some(-2));
        assert_eq!(standings.history().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonStore::new(dir.path());
        fs::write(store.scoreboard_path(), "{not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(err.message.contains("scoreboard.json"));
    }
}
