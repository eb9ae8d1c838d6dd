//! The 3x3 grid.

use crate::rules::{check_winner, is_full};
use crate::{IllegalMove, Player, Square};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// 3x3 tic-tac-toe board.
///
/// Cells are addressed `0..9` in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; CELL_COUNT],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; CELL_COUNT],
        }
    }

    /// Gets the square at the given cell, or `None` when out of range.
    pub fn get(&self, cell: usize) -> Option<Square> {
        self.squares.get(cell).copied()
    }

    /// Checks if a cell is in range and empty.
    pub fn is_empty(&self, cell: usize) -> bool {
        matches!(self.get(cell), Some(Square::Empty))
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; CELL_COUNT] {
        &self.squares
    }

    /// Places `player`'s mark on `cell` and returns the updated board.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalMove::OutOfRange`] for an index outside `0..9` and
    /// [`IllegalMove::Occupied`] for a cell that already holds a mark. The
    /// board is left unchanged in both cases.
    #[instrument(skip(self))]
    pub fn place(&mut self, cell: usize, player: Player) -> Result<&Self, IllegalMove> {
        match self.get(cell) {
            None => Err(IllegalMove::OutOfRange(cell)),
            Some(Square::Occupied(_)) => Err(IllegalMove::Occupied(cell)),
            Some(Square::Empty) => {
                self.squares[cell] = Square::Occupied(player);
                debug!(cell, %player, "Mark placed");
                Ok(self)
            }
        }
    }

    /// Returns the player holding a complete line, if any.
    pub fn winner(&self) -> Option<Player> {
        check_winner(self)
    }

    /// Returns true when no empty cell remains.
    pub fn is_full(&self) -> bool {
        is_full(self)
    }

    /// Indices of all empty cells, ascending.
    pub fn empty_cells(&self) -> Vec<usize> {
        self.squares
            .iter()
            .enumerate()
            .filter(|(_, square)| **square == Square::Empty)
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Number of marks on the board.
    pub fn marks_placed(&self) -> usize {
        CELL_COUNT - self.empty_cells().len()
    }
}

/// Renders the board as three rows; empty cells show their 1-based number.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let cell = row * 3 + col;
                match self.squares[cell] {
                    Square::Empty => write!(f, "{}", cell + 1)?,
                    Square::Occupied(player) => write!(f, "{}", player)?,
                }
                if col < 2 {
                    f.write_str("|")?;
                }
            }
            if row < 2 {
                f.write_str("\n-+-+-\n")?;
            }
        }
        Ok(())
    }
}
