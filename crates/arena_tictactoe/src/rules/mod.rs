//! Game rules for tic-tac-toe.
//!
//! Pure functions over a [`Board`](crate::Board) snapshot. They never mutate
//! the board, so they can run after every placement.

mod draw;
mod win;

pub use draw::is_full;
pub use win::{LINES, check_winner};
