//! Command-line interface for tictactoe_arena.

use clap::{Parser, Subcommand};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Tic-tac-toe arena - networked two-player tic-tac-toe
#[derive(Parser, Debug)]
#[command(name = "tictactoe_arena")]
#[command(about = "Networked tic-tac-toe server and terminal client", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Game listener address (overrides config)
        #[arg(long)]
        game_addr: Option<SocketAddr>,

        /// Web view address (overrides config)
        #[arg(long)]
        web_addr: Option<SocketAddr>,

        /// Directory for scoreboard.json and history.json (overrides config)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Seconds per turn before a move is forced (overrides config)
        #[arg(long)]
        turn_timeout: Option<u64>,

        /// Do not answer LAN discovery requests
        #[arg(long)]
        no_discovery: bool,

        /// Seed for forced-move selection (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// PEM certificate chain; enables TLS together with --tls-key
        #[arg(long, requires = "tls_key")]
        tls_cert: Option<PathBuf>,

        /// PEM private key for --tls-cert
        #[arg(long, requires = "tls_cert")]
        tls_key: Option<PathBuf>,
    },

    /// Play a game from this terminal
    Play {
        /// Server address. If not provided, the server is discovered on the LAN.
        #[arg(short, long)]
        server: Option<SocketAddr>,

        /// Nickname to send. If not provided, you are asked for one.
        #[arg(short, long)]
        nickname: Option<String>,

        /// Discovery port
        #[arg(long, default_value = "5051")]
        discovery_port: u16,

        /// Discovery multicast group
        #[arg(long, default_value = "224.0.0.1")]
        group: Ipv4Addr,

        /// Connect over TLS, trusting this PEM certificate (e.g. the server's)
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        /// Name the server certificate must carry
        #[arg(long, default_value = "localhost")]
        tls_name: String,
    },

    /// Look for a server on the LAN and print its address
    Discover {
        /// Discovery port
        #[arg(long, default_value = "5051")]
        discovery_port: u16,

        /// Discovery multicast group
        #[arg(long, default_value = "224.0.0.1")]
        group: Ipv4Addr,
    },
}
