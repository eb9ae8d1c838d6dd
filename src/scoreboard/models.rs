//! Standings records as they are persisted and served.

use crate::sink::MatchResult;
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Timestamp format used in history entries.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Running tally for one nickname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct ScoreEntry {
    nickname: String,
    score: i64,
}

/// One finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct HistoryEntry {
    /// Participants as `"winner-loser"`, or `"first-second"` for a draw.
    nicknames: String,
    /// Winner's nickname; `None` for a draw.
    winner: Option<String>,
    /// When the match ended, formatted with [`DATE_FORMAT`].
    date: String,
}

/// Score table plus append-only history.
///
/// The score table holds at most one entry per nickname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct Standings {
    scores: Vec<ScoreEntry>,
    history: Vec<HistoryEntry>,
}

impl Standings {
    /// Builds standings from loaded records, merging duplicate nicknames.
    #[instrument(skip_all, fields(scores = scores.len(), history = history.len()))]
    pub fn from_records(scores: Vec<ScoreEntry>, history: Vec<HistoryEntry>) -> Self {
        let mut standings = Self {
            scores: Vec::with_capacity(scores.len()),
            history,
        };
        for entry in scores {
            standings.adjust(&entry.nickname, entry.score);
        }
        standings
    }

    /// Folds one match result into the standings.
    ///
    /// Win: winner +1, loser -1, absent nicknames seeded at that delta.
    /// Draw: history only.
    #[instrument(skip(self))]
    pub fn apply(&mut self, result: &MatchResult, date: String) {
        let entry = match result {
            MatchResult::Win { winner, loser } => {
                self.adjust(winner, 1);
                self.adjust(loser, -1);
                HistoryEntry::new(format!("{}-{}", winner, loser), Some(winner.clone()), date)
            }
            MatchResult::Draw { first, second } => {
                HistoryEntry::new(format!("{}-{}", first, second), None, date)
            }
        };
        self.history.push(entry);
    }

    /// Current score for `nickname`, if it has ever won or lost.
    pub fn score_of(&self, nickname: &str) -> Option<i64> {
        self.scores
            .iter()
            .find(|entry| entry.nickname == nickname)
            .map(|entry| entry.score)
    }

    /// Scores ordered best first; ties keep first-seen order.
    pub fn ranked(&self) -> Vec<ScoreEntry> {
        let mut ranked = self.scores.clone();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// History ordered most recent first.
    pub fn recent_first(&self) -> Vec<HistoryEntry> {
        let mut recent: Vec<_> = self.history.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.date.cmp(&a.date));
        recent
    }

    fn adjust(&mut self, nickname: &str, delta: i64) {
        match self.scores.iter_mut().find(|entry| entry.nickname == nickname) {
            Some(entry) => {
                entry.score += delta;
                debug!(nickname, delta, score = entry.score, "Score adjusted");
            }
            None => {
                info!(nickname, score = delta, "Adding new player");
                self.scores.push(ScoreEntry::new(nickname.to_string(), delta));
            }
        }
    }
}
