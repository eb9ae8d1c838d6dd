//! Tic-tac-toe arena - Unified CLI
//!
//! Runs the game server or a terminal client.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tictactoe_arena::{
    ClientTls, DEFAULT_ATTEMPTS, DEFAULT_WAIT, GameServer, ServerConfig, TlsConfig, discover, play,
};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            game_addr,
            web_addr,
            data_dir,
            turn_timeout,
            no_discovery,
            seed,
            tls_cert,
            tls_key,
        } => {
            init_tracing("info,tictactoe_arena=debug");
            let overrides = Overrides {
                game_addr,
                web_addr,
                data_dir,
                turn_timeout,
                no_discovery,
                seed,
                tls: tls_cert.zip(tls_key).map(|(cert, key)| TlsConfig::new(cert, key)),
            };
            run_server(config, overrides).await
        }
        Command::Play {
            server,
            nickname,
            discovery_port,
            group,
            ca_cert,
            tls_name,
        } => {
            // Keep the terminal clean for the game unless RUST_LOG asks otherwise.
            init_tracing("warn");
            let tls = ca_cert
                .map(|path| ClientTls::from_ca_file(&path, &tls_name))
                .transpose()?;
            let addr = match server {
                Some(addr) => addr,
                None => locate(discovery_port, group).await?,
            };
            play(addr, nickname, tls)
                .await
                .with_context(|| format!("Connection to {} failed", addr))
        }
        Command::Discover {
            discovery_port,
            group,
        } => {
            init_tracing("warn");
            let addr = locate(discovery_port, group).await?;
            println!("{}", addr);
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// Command-line values that take precedence over the config file.
struct Overrides {
    game_addr: Option<SocketAddr>,
    web_addr: Option<SocketAddr>,
    data_dir: Option<PathBuf>,
    turn_timeout: Option<u64>,
    no_discovery: bool,
    seed: Option<u64>,
    tls: Option<TlsConfig>,
}

impl Overrides {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(addr) = self.game_addr {
            config = config.with_game_addr(addr);
        }
        if let Some(addr) = self.web_addr {
            config = config.with_web_addr(addr);
        }
        if let Some(dir) = self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(secs) = self.turn_timeout {
            config = config.with_turn_timeout_secs(secs);
        }
        if self.no_discovery {
            config = config.with_discovery_enabled(false);
        }
        if self.seed.is_some() {
            config = config.with_rng_seed(self.seed);
        }
        if self.tls.is_some() {
            config = config.with_tls(self.tls);
        }
        config
    }
}

/// Run the game server until Ctrl-C
#[instrument(skip(overrides))]
async fn run_server(config_path: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let config = overrides.apply(ServerConfig::load(config_path.as_deref())?);
    anyhow::ensure!(
        *config.turn_timeout_secs() > 0,
        "turn timeout must be at least one second"
    );

    info!("Starting tic-tac-toe arena");
    let server = GameServer::bind(config).await?;
    info!(
        game_addr = %server.game_addr()?,
        web_addr = %server.web_addr()?,
        "Server ready - connect with `tictactoe_arena play`"
    );

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

/// Find a server through LAN discovery
async fn locate(port: u16, group: Ipv4Addr) -> Result<SocketAddr> {
    let target = SocketAddr::new(IpAddr::V4(group), port);
    let addr = discover(target, DEFAULT_ATTEMPTS, DEFAULT_WAIT)
        .await
        .context("No server found on the LAN; pass --server")?;
    info!(%addr, "Using discovered server");
    Ok(addr)
}
