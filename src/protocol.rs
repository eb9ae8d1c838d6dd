//! Text protocol spoken with game clients.
//!
//! Every server message is UTF-8 text followed by a newline; a message may
//! span several lines (the board rendering does). Clients answer with one
//! line per message. Moves are typed as `1`-`9`, matching the numbers the
//! board rendering shows in empty cells.

use arena_tictactoe::{Board, CELL_COUNT, Player};
use derive_more::{Display, Error};
use std::fmt;
use tracing::instrument;

/// Messages the server sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Asks a freshly connected client for its nickname.
    NicknamePrompt,
    /// Sent while the peer sits in the lobby without an opponent.
    Waiting,
    /// Announces the pairing.
    GameStart {
        /// Nickname of the other peer.
        opponent: String,
        /// Mark assigned to the recipient.
        mark: Player,
    },
    /// Current board rendering.
    Board(Board),
    /// Asks the recipient for a move.
    TurnPrompt(Player),
    /// The last response was not a legal move.
    InvalidMove,
    /// A move was applied.
    MovePlayed {
        /// Nickname of the mover.
        nickname: String,
        /// Mark of the mover.
        mark: Player,
        /// Zero-based cell index.
        cell: usize,
        /// True when the server chose the cell after a turn timeout.
        forced: bool,
    },
    /// The game ended with a winner.
    Winner {
        /// Nickname of the winner.
        nickname: String,
        /// Mark of the winner.
        mark: Player,
    },
    /// The game ended in a draw.
    Draw,
    /// The opponent disconnected; the match is over.
    OpponentLeft(String),
    /// Where the standings can be viewed.
    StandingsLink(String),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NicknamePrompt => write!(f, "Enter your nickname:"),
            Self::Waiting => write!(f, "Waiting for an opponent..."),
            Self::GameStart { opponent, mark } => {
                write!(f, "Game starting! Your opponent is {}. You play {}.", opponent, mark)
            }
            Self::Board(board) => write!(f, "{}", board),
            Self::TurnPrompt(mark) => write!(f, "Your move ({}). Enter a position (1-9):", mark),
            Self::InvalidMove => write!(f, "Invalid move! Try again."),
            Self::MovePlayed {
                nickname,
                mark,
                cell,
                forced,
            } => {
                write!(f, "{} ({}) played {}", nickname, mark, cell + 1)?;
                if *forced {
                    write!(f, " (timeout)")?;
                }
                Ok(())
            }
            Self::Winner { nickname, mark } => {
                write!(f, "Game over! Winner: {} ({})", nickname, mark)
            }
            Self::Draw => write!(f, "Game over! It's a draw!"),
            Self::OpponentLeft(nickname) => write!(
                f,
                "Your opponent {} has left the game. Please play another one.",
                nickname
            ),
            Self::StandingsLink(url) => {
                write!(f, "Scoreboard and history of games can be seen under: {}", url)
            }
        }
    }
}

/// Why a client response is not a move.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum MoveParseError {
    /// The response is not a decimal number.
    #[display("'{}' is not a number", _0)]
    NotANumber(#[error(not(source))] String),
    /// The number is outside `1..=9`.
    #[display("{} is not a position between 1 and 9", _0)]
    OutOfRange(#[error(not(source))] usize),
}

/// Parses a client response into a zero-based cell index.
///
/// Surrounding whitespace is ignored. Occupancy is not checked here.
#[instrument]
pub fn parse_move(text: &str) -> Result<usize, MoveParseError> {
    let trimmed = text.trim();
    let number: usize = trimmed
        .parse()
        .map_err(|_| MoveParseError::NotANumber(trimmed.to_string()))?;
    if (1..=CELL_COUNT).contains(&number) {
        Ok(number - 1)
    } else {
        Err(MoveParseError::OutOfRange(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_is_one_based() {
        assert_eq!(parse_move("1"), Ok(0));
        assert_eq!(parse_move(" 5 \r"), Ok(4));
        assert_eq!(parse_move("9"), Ok(8));
    }

    #[test]
    fn test_parse_move_rejects_garbage() {
        assert_eq!(parse_move("0"), Err(MoveParseError::OutOfRange(0)));
        assert_eq!(parse_move("10"), Err(MoveParseError::OutOfRange(10)));
        assert_eq!(
            parse_move("center"),
            Err(MoveParseError::NotANumber("center".to_string()))
        );
        assert_eq!(parse_move(""), Err(MoveParseError::NotANumber(String::new())));
        assert!(matches!(parse_move("-3"), Err(MoveParseError::NotANumber(_))));
    }

    #[test]
    fn test_forced_move_is_tagged() {
        let msg = ServerMessage::MovePlayed {
            nickname: "alice".to_string(),
            mark: Player::X,
            cell: 3,
            forced: true,
        };
        assert_eq!(msg.to_string(), "alice (X) played 4 (timeout)");
    }

    #[test]
    fn test_opponent_left_names_opponent() {
        let msg = ServerMessage::OpponentLeft("bob".to_string());
        assert!(msg.to_string().contains("bob has left the game"));
    }
}
