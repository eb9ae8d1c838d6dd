//! Pure tic-tac-toe board logic.
//!
//! This crate owns the 3x3 grid and nothing else: placing marks, detecting
//! a completed line, and detecting a full board. It performs no I/O and
//! holds no turn state, so the match coordinator in `tictactoe_arena` is
//! the only place where turn order is enforced.
//!
//! # Example
//!
//! ```
//! use arena_tictactoe::{Board, Player};
//!
//! let mut board = Board::new();
//! for cell in [0, 3, 6] {
//!     board.place(cell, Player::X).unwrap();
//! }
//! assert_eq!(board.winner(), Some(Player::X));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
mod error;
mod rules;
mod types;

pub use board::{Board, CELL_COUNT};
pub use error::IllegalMove;
pub use rules::{LINES, check_winner, is_full};
pub use types::{Player, Square};
