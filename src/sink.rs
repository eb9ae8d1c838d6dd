//! The narrow interface a session uses to hand off its outcome.

/// Outcome of a finished match, by nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// One player completed a line.
    Win {
        /// Nickname of the winner.
        winner: String,
        /// Nickname of the loser.
        loser: String,
    },
    /// The board filled without a winner.
    Draw {
        /// Nickname of the player who moved first.
        first: String,
        /// Nickname of the player who moved second.
        second: String,
    },
}

impl MatchResult {
    /// Nickname of the winner, if the match was not a draw.
    pub fn winner(&self) -> Option<&str> {
        match self {
            Self::Win { winner, .. } => Some(winner),
            Self::Draw { .. } => None,
        }
    }

    /// Nickname of the loser, if the match was not a draw.
    pub fn loser(&self) -> Option<&str> {
        match self {
            Self::Win { loser, .. } => Some(loser),
            Self::Draw { .. } => None,
        }
    }
}

/// Durable recorder of match outcomes.
///
/// Implementations must serialize concurrent calls internally and must not
/// fail observably: persistence problems are logged, not returned.
pub trait ResultSink: Send + Sync {
    /// Records one finished match. Each call is one historical event.
    fn record(&self, result: MatchResult);
}
