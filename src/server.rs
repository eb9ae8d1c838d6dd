//! The game server process: TCP lobby (optionally over TLS), web view, and
//! discovery responder.

use crate::channel::NetChannel;
use crate::config::ServerConfig;
use crate::discovery::{DiscoveryResponder, outbound_ip};
use crate::lobby::{Lobby, admit_logged};
use crate::registry::SessionRegistry;
use crate::scoreboard::{JsonStore, Scoreboard, StoreError};
use crate::session::SessionSettings;
use crate::tls::{TlsError, server_acceptor};
use crate::web::{WebState, router};
use derive_more::{Display, Error, From};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, instrument, warn};

/// Errors that stop the server from starting or shutting down cleanly.
#[derive(Debug, Display, Error, From)]
pub enum ServerError {
    /// Binding a listener failed.
    #[display("Server I/O error: {}", _0)]
    Io(std::io::Error),
    /// Loading or saving standings failed.
    #[display("{}", _0)]
    Store(StoreError),
    /// The TLS certificate or key could not be loaded.
    #[display("{}", _0)]
    Tls(TlsError),
}

/// A bound, ready-to-run game server.
pub struct GameServer {
    game_listener: TcpListener,
    web_listener: TcpListener,
    discovery: Option<DiscoveryResponder>,
    scoreboard: Arc<Scoreboard>,
    registry: SessionRegistry,
    lobby: Arc<Lobby<NetChannel>>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl GameServer {
    /// Loads standings and binds every listener named in `config`.
    ///
    /// A discovery responder that cannot bind is logged and skipped; the
    /// game and web listeners are required.
    #[instrument(skip(config), fields(game_addr = %config.game_addr(), web_addr = %config.web_addr()))]
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let scoreboard = Arc::new(Scoreboard::open(
            JsonStore::new(config.data_dir().clone()),
            *config.autosave(),
        )?);
        let tls = match config.tls() {
            Some(tls) => Some(server_acceptor(tls.cert_path(), tls.key_path())?),
            None => None,
        };

        let game_listener = TcpListener::bind(config.game_addr()).await?;
        let web_listener = TcpListener::bind(config.web_addr()).await?;
        let game_addr = game_listener.local_addr()?;
        let web_addr = web_listener.local_addr()?;

        let host = advertised_host(&config, game_addr.ip());
        let standings_url = format!("http://{}:{}", host, web_addr.port());
        info!(%game_addr, %web_addr, %standings_url, tls = tls.is_some(), "Listeners bound");

        let discovery = if *config.discovery().enabled() {
            let announced = SocketAddr::new(host, game_addr.port());
            match DiscoveryResponder::bind_multicast(
                *config.discovery().port(),
                *config.discovery().group(),
                announced,
            )
            .await
            {
                Ok(responder) => Some(responder),
                Err(err) => {
                    warn!(error = %err, "Discovery disabled");
                    None
                }
            }
        } else {
            debug!("Discovery disabled by configuration");
            None
        };

        let registry = SessionRegistry::new();
        let lobby = Arc::new(Lobby::new(
            registry.clone(),
            scoreboard.clone(),
            SessionSettings::new(config.turn_timeout(), Some(standings_url)),
            config.nickname_timeout(),
            *config.rng_seed(),
        ));

        Ok(Self {
            game_listener,
            web_listener,
            discovery,
            scoreboard,
            registry,
            lobby,
            tls,
            handshake_timeout: config.nickname_timeout(),
        })
    }

    /// Address the game listener is bound to.
    pub fn game_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.game_listener.local_addr()?)
    }

    /// Address the web view is bound to.
    pub fn web_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.web_listener.local_addr()?)
    }

    /// The live scoreboard.
    pub fn scoreboard(&self) -> Arc<Scoreboard> {
        Arc::clone(&self.scoreboard)
    }

    /// The live session registry.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Accepts connections until `shutdown` completes, then flushes the
    /// standings to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] if the final flush fails.
    #[instrument(skip_all)]
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let web = WebState::new(self.scoreboard.clone(), self.registry.clone());
        let web_listener = self.web_listener;
        let web_task = tokio::spawn(async move {
            if let Err(err) = axum::serve(web_listener, router(web)).await {
                error!(error = %err, "Web view stopped");
            }
        });
        let discovery_task = self.discovery.map(|responder| tokio::spawn(responder.serve()));
        let admission = Admission {
            lobby: self.lobby,
            tls: self.tls,
            handshake_timeout: self.handshake_timeout,
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.game_listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!(%peer_addr, "Accepted connection");
                        if let Err(err) = stream.set_nodelay(true) {
                            debug!(error = %err, "Could not set TCP_NODELAY");
                        }
                        admission.spawn(stream, peer_addr);
                    }
                    Err(err) => warn!(error = %err, "Accept failed"),
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        web_task.abort();
        if let Some(task) = discovery_task {
            task.abort();
        }
        self.scoreboard.flush()?;
        info!(active_sessions = self.registry.len(), "Standings saved, server stopped");
        Ok(())
    }
}

/// What the accept loop needs to hand connections to the lobby.
struct Admission {
    lobby: Arc<Lobby<NetChannel>>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl Admission {
    /// Admits a fresh connection in its own task, after the TLS handshake
    /// when TLS is enabled. The handshake shares the nickname deadline.
    fn spawn(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let lobby = Arc::clone(&self.lobby);
        let Some(acceptor) = self.tls.clone() else {
            tokio::spawn(admit_logged(lobby, NetChannel::from_stream(stream)));
            return;
        };
        let handshake_timeout = self.handshake_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => {
                    debug!(%peer_addr, "TLS handshake complete");
                    admit_logged(lobby, NetChannel::from_stream(tls_stream)).await;
                }
                Ok(Err(err)) => warn!(%peer_addr, error = %err, "TLS handshake failed"),
                Err(_) => warn!(%peer_addr, "TLS handshake timed out"),
            }
        });
    }
}

/// Address clients should use to reach this host.
fn advertised_host(config: &ServerConfig, bound: IpAddr) -> IpAddr {
    match config.discovery().advertise_ip() {
        Some(ip) => IpAddr::V4(*ip),
        None if bound.is_unspecified() => outbound_ip(),
        None => bound,
    }
}

