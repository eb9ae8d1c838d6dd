//! Tic-tac-toe arena - networked two-player tic-tac-toe server
//!
//! Clients connect over TCP (optionally TLS), name themselves, and are paired first come
//! first served. Each pair plays one match coordinated entirely by the
//! server; results feed a persistent scoreboard served over HTTP.
//!
//! # Architecture
//!
//! - **Lobby**: nickname handshake and FIFO matchmaking
//! - **Session**: turn loop with per-turn timeout and forced moves
//! - **Scoreboard**: serialized score table and match history, saved as JSON
//! - **Web**: read-only standings pages and JSON endpoints
//! - **Discovery**: UDP multicast responder so LAN clients can find the server
//!
//! # Example
//!
//! ```no_run
//! use tictactoe_arena::{GameServer, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = GameServer::bind(ServerConfig::default()).await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod channel;
mod client;
mod config;
mod discovery;
mod lobby;
mod matchmaker;
mod protocol;
mod registry;
mod scoreboard;
mod server;
mod session;
mod sink;
mod tls;
mod web;

// Crate-level exports - Peer channels
pub use channel::{
    BoxedWriter, ChannelError, INBOUND_CAPACITY, LineChannel, MAX_LINE_LENGTH, NetChannel, Peer,
    PeerChannel,
};

// Crate-level exports - Wire protocol
pub use protocol::{MoveParseError, ServerMessage, parse_move};

// Crate-level exports - Match coordination
pub use lobby::{Lobby, admit_logged};
pub use matchmaker::{Matchmaker, Pairing};
pub use registry::{ActiveMatch, Registration, SessionRegistry};
pub use session::{
    DEFAULT_TURN_TIMEOUT, Session, SessionId, SessionReport, SessionSettings, SessionStatus,
    forced_move,
};

// Crate-level exports - Results and standings
pub use scoreboard::{HistoryEntry, JsonStore, ScoreEntry, Scoreboard, Standings, StoreError};
pub use sink::{MatchResult, ResultSink};

// Crate-level exports - Server, web view, discovery, client, TLS
pub use client::{play, run_client};
pub use config::{ConfigError, DiscoveryConfig, ServerConfig, TlsConfig};
pub use discovery::{
    DEFAULT_ATTEMPTS, DEFAULT_WAIT, DISCOVERY_REQUEST, DiscoveryError, DiscoveryResponder,
    discover, is_discovery_request, outbound_ip, parse_announcement,
};
pub use server::{GameServer, ServerError};
pub use tls::{ClientTls, TlsError, server_acceptor};
pub use web::{WebState, escape_html, router};

// Re-export the board engine
pub use arena_tictactoe::{Board, IllegalMove, Player, Square};
