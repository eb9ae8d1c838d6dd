//! Persistent standings: per-nickname scores and the match history.

mod error;
mod models;
mod service;
mod store;

pub use error::StoreError;
pub use models::{HistoryEntry, ScoreEntry, Standings};
pub use service::Scoreboard;
pub use store::JsonStore;
