//! Match session coordinator.
//!
//! A [`Session`] owns one paired game: the board, the turn pointer, and
//! both peers. It prompts the player to move, applies legal moves, forces
//! a random move when the turn deadline passes, detects the end of the
//! game, and hands the outcome to a [`ResultSink`]. A disconnect at any
//! point aborts the match without touching the standings.

use crate::channel::{ChannelError, Peer, PeerChannel};
use crate::protocol::{ServerMessage, parse_move};
use crate::sink::{MatchResult, ResultSink};
use arena_tictactoe::{Board, Player};
use derive_getters::Getters;
use derive_new::new;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Unique identifier for a session.
pub type SessionId = String;

/// Default time a player has to answer a turn prompt.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a session. Every variant except `InProgress` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Moves are still being played.
    InProgress,
    /// A player completed a line.
    Won(Player),
    /// The board filled without a winner.
    Draw,
    /// A peer disconnected; `left` is the mark of the peer that went away.
    Aborted {
        /// Mark of the departed peer.
        left: Player,
    },
}

impl SessionStatus {
    /// Returns true for every status except `InProgress`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

/// Per-session tunables.
#[derive(Debug, Clone, Getters, new)]
pub struct SessionSettings {
    /// Time allowed to answer each turn prompt.
    turn_timeout: Duration,
    /// Standings URL announced to both peers when a game finishes.
    standings_url: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_TIMEOUT, None)
    }
}

/// What a finished session reports back to whoever spawned it.
#[derive(Debug, Clone, Getters)]
pub struct SessionReport {
    id: SessionId,
    status: SessionStatus,
    board: Board,
    plies: usize,
    forced_moves: usize,
}

/// Raised inside the turn loop when a peer can no longer be reached.
#[derive(Debug, Clone, Copy)]
struct Departure(Player);

/// Picks the cell for a timed-out player: uniform over the empty cells.
///
/// Returns `None` only for a full board.
pub fn forced_move<R: Rng + ?Sized>(board: &Board, rng: &mut R) -> Option<usize> {
    let empty = board.empty_cells();
    if empty.is_empty() {
        None
    } else {
        Some(empty[rng.gen_range(0..empty.len())])
    }
}

/// Authoritative coordinator for one match between two peers.
pub struct Session<C> {
    id: SessionId,
    /// Seat 0 plays X and moves first.
    seats: [Peer<C>; 2],
    board: Board,
    turn: Player,
    status: SessionStatus,
    plies: usize,
    forced_moves: usize,
    rng: StdRng,
    settings: SessionSettings,
    sink: Arc<dyn ResultSink>,
}

impl<C: PeerChannel> Session<C> {
    /// Creates a session. `first` plays X and moves first.
    #[instrument(skip_all, fields(session_id = %id, first = %first.nickname(), second = %second.nickname()))]
    pub fn new(
        id: SessionId,
        first: Peer<C>,
        second: Peer<C>,
        settings: SessionSettings,
        sink: Arc<dyn ResultSink>,
        rng: StdRng,
    ) -> Self {
        info!("Creating session");
        Self {
            id,
            seats: [first, second],
            board: Board::new(),
            turn: Player::X,
            status: SessionStatus::InProgress,
            plies: 0,
            forced_moves: 0,
            rng,
            settings,
            sink,
        }
    }

    /// Runs the match to completion and releases both peers.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn run(mut self) -> SessionReport {
        info!("Session started");

        if let Err(Departure(left)) = self.play().await {
            self.abort(left).await;
        }
        if let Some(url) = self.settings.standings_url.clone() {
            if !matches!(self.status, SessionStatus::Aborted { .. }) {
                self.broadcast_best_effort(&ServerMessage::StandingsLink(url))
                    .await;
            }
        }
        for seat in &mut self.seats {
            seat.channel_mut().close().await;
        }

        info!(status = ?self.status, plies = self.plies, "Session finished");
        SessionReport {
            id: self.id,
            status: self.status,
            board: self.board,
            plies: self.plies,
            forced_moves: self.forced_moves,
        }
    }

    async fn play(&mut self) -> Result<(), Departure> {
        for mark in [Player::X, Player::O] {
            let start = ServerMessage::GameStart {
                opponent: self.nickname(mark.opponent()).to_string(),
                mark,
            };
            self.send_to(mark, &start).await?;
        }
        self.broadcast(&ServerMessage::Board(self.board.clone()))
            .await?;

        while self.status == SessionStatus::InProgress {
            let (cell, forced) = self.next_move().await?;
            self.conclude_ply(cell, forced).await?;
        }
        Ok(())
    }

    /// Obtains and places the active player's move.
    ///
    /// Invalid responses are answered to the mover only and re-prompted.
    /// Every prompt opens a fresh turn window.
    async fn next_move(&mut self) -> Result<(usize, bool), Departure> {
        let player = self.turn;
        assert!(
            !self.board.is_full(),
            "awaiting a move on a full board without a terminal status"
        );

        loop {
            self.send_to(player, &ServerMessage::TurnPrompt(player))
                .await?;
            let response = self.seats[seat_index(player)]
                .channel_mut()
                .receive(self.settings.turn_timeout)
                .await;

            match response {
                Ok(text) => {
                    let placed = parse_move(&text)
                        .map_err(|e| e.to_string())
                        .and_then(|cell| {
                            self.board
                                .place(cell, player)
                                .map(|_| cell)
                                .map_err(|e| e.to_string())
                        });
                    match placed {
                        Ok(cell) => {
                            debug!(%player, cell, "Move accepted");
                            return Ok((cell, false));
                        }
                        Err(reason) => {
                            debug!(%player, %text, %reason, "Invalid move");
                            self.send_to(player, &ServerMessage::InvalidMove).await?;
                        }
                    }
                }
                Err(ChannelError::Timeout) => {
                    let Some(cell) = forced_move(&self.board, &mut self.rng) else {
                        unreachable!("no empty cell for a forced move");
                    };
                    if let Err(err) = self.board.place(cell, player) {
                        unreachable!("forced move on empty cell rejected: {}", err);
                    }
                    warn!(%player, cell, "Turn timed out, forcing move");
                    self.forced_moves += 1;
                    return Ok((cell, true));
                }
                Err(ChannelError::Disconnected) => {
                    info!(%player, "Peer disconnected while awaiting move");
                    return Err(Departure(player));
                }
            }
        }
    }

    /// Evaluates the board after a placement and tells both peers.
    ///
    /// A decided game is recorded before anything is sent, so a peer that
    /// drops during the final broadcast cannot erase the result.
    async fn conclude_ply(&mut self, cell: usize, forced: bool) -> Result<(), Departure> {
        let mover = self.turn;
        self.plies += 1;
        let played = ServerMessage::MovePlayed {
            nickname: self.nickname(mover).to_string(),
            mark: mover,
            cell,
            forced,
        };

        if let Some(winner) = self.board.winner() {
            self.finish(SessionStatus::Won(winner));
            self.record(MatchResult::Win {
                winner: self.nickname(winner).to_string(),
                loser: self.nickname(winner.opponent()).to_string(),
            })
            .await;
            let announcement = ServerMessage::Winner {
                nickname: self.nickname(winner).to_string(),
                mark: winner,
            };
            self.broadcast_best_effort(&played).await;
            self.broadcast_best_effort(&ServerMessage::Board(self.board.clone()))
                .await;
            self.broadcast_best_effort(&announcement).await;
            return Ok(());
        }

        if self.board.is_full() {
            self.finish(SessionStatus::Draw);
            self.record(MatchResult::Draw {
                first: self.nickname(Player::X).to_string(),
                second: self.nickname(Player::O).to_string(),
            })
            .await;
            self.broadcast_best_effort(&played).await;
            self.broadcast_best_effort(&ServerMessage::Board(self.board.clone()))
                .await;
            self.broadcast_best_effort(&ServerMessage::Draw).await;
            return Ok(());
        }

        self.broadcast(&played).await?;
        self.broadcast(&ServerMessage::Board(self.board.clone()))
            .await?;
        self.turn = mover.opponent();
        Ok(())
    }

    /// Hands the result to the sink on the blocking pool; the sink may
    /// write to disk.
    async fn record(&mut self, result: MatchResult) {
        let sink = Arc::clone(&self.sink);
        if let Err(err) = tokio::task::spawn_blocking(move || sink.record(result)).await {
            error!(error = %err, "Recording the match result failed");
        }
    }

    async fn abort(&mut self, left: Player) {
        warn!(%left, nickname = %self.nickname(left), "Peer left, aborting session");
        self.finish(SessionStatus::Aborted { left });
        let notice = ServerMessage::OpponentLeft(self.nickname(left).to_string());
        if self.send_to(left.opponent(), &notice).await.is_err() {
            debug!("Remaining peer already gone");
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        debug_assert!(
            !self.status.is_terminal(),
            "session status changed twice: {:?} -> {:?}",
            self.status,
            status
        );
        info!(?status, "Session reached terminal state");
        self.status = status;
    }

    fn nickname(&self, mark: Player) -> &str {
        self.seats[seat_index(mark)].nickname()
    }

    async fn send_to(&mut self, mark: Player, message: &ServerMessage) -> Result<(), Departure> {
        self.seats[seat_index(mark)]
            .channel_mut()
            .send(&message.to_string())
            .await
            .map_err(|_| Departure(mark))
    }

    async fn broadcast(&mut self, message: &ServerMessage) -> Result<(), Departure> {
        for mark in [Player::X, Player::O] {
            self.send_to(mark, message).await?;
        }
        Ok(())
    }

    async fn broadcast_best_effort(&mut self, message: &ServerMessage) {
        for mark in [Player::X, Player::O] {
            if self.send_to(mark, message).await.is_err() {
                debug!(%mark, "Could not deliver final message");
            }
        }
    }
}

fn seat_index(mark: Player) -> usize {
    match mark {
        Player::X => 0,
        Player::O => 1,
    }
}
