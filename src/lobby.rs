//! Admission of new connections: nickname handshake, queueing, and
//! session launch.

use crate::channel::{ChannelError, Peer, PeerChannel};
use crate::matchmaker::Matchmaker;
use crate::protocol::ServerMessage;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionReport, SessionSettings};
use crate::sink::ResultSink;
use derive_getters::Getters;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

/// Front door of the game server.
///
/// Shared behind an [`Arc`] by every connection task.
#[derive(Getters)]
pub struct Lobby<C> {
    matchmaker: Matchmaker<C>,
    registry: SessionRegistry,
    #[getter(skip)]
    sink: Arc<dyn ResultSink>,
    settings: SessionSettings,
    nickname_timeout: Duration,
    rng_seed: Option<u64>,
    /// Serializes the pair-or-wait step so a waiting notice always reaches
    /// a lone peer before anyone can pair with it.
    #[getter(skip)]
    admission: Mutex<()>,
}

impl<C: PeerChannel> Lobby<C> {
    /// Creates a lobby that records results into `sink`.
    pub fn new(
        registry: SessionRegistry,
        sink: Arc<dyn ResultSink>,
        settings: SessionSettings,
        nickname_timeout: Duration,
        rng_seed: Option<u64>,
    ) -> Self {
        Self {
            matchmaker: Matchmaker::new(),
            registry,
            sink,
            settings,
            nickname_timeout,
            rng_seed,
            admission: Mutex::new(()),
        }
    }

    /// Greets a new connection and queues it for a match.
    ///
    /// Returns the handle of the session task when this peer completed a
    /// pair, `None` when it is left waiting.
    ///
    /// # Errors
    ///
    /// Fails when the client leaves or stays silent before naming itself.
    #[instrument(skip_all)]
    pub async fn admit(
        self: &Arc<Self>,
        mut channel: C,
    ) -> Result<Option<JoinHandle<SessionReport>>, ChannelError> {
        channel
            .send(&ServerMessage::NicknamePrompt.to_string())
            .await?;
        let nickname = match channel.receive(self.nickname_timeout).await {
            Ok(line) => line.trim().to_string(),
            Err(err) => {
                debug!(error = %err, "No nickname received");
                channel.close().await;
                return Err(err);
            }
        };
        info!(%nickname, "Peer joined lobby");

        let _admission = self.admission.lock().await;
        match self.matchmaker.pair_with_waiting(Peer::new(nickname, channel)) {
            Ok((first, second)) => Ok(Some(self.start_session(first, second))),
            Err(mut peer) => {
                peer.channel_mut()
                    .send(&ServerMessage::Waiting.to_string())
                    .await?;
                self.matchmaker.park(peer);
                Ok(None)
            }
        }
    }

    /// Spawns a session for a freshly paired couple.
    pub fn start_session(&self, first: Peer<C>, second: Peer<C>) -> JoinHandle<SessionReport> {
        let sequence = self.registry.next_sequence();
        let id = format!("match-{}", sequence);
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(sequence)),
            None => StdRng::from_entropy(),
        };
        let registration = self
            .registry
            .register(id.clone(), first.nickname(), second.nickname());
        let session = Session::new(
            id.clone(),
            first,
            second,
            self.settings.clone(),
            Arc::clone(&self.sink),
            rng,
        );

        tokio::spawn(
            async move {
                let report = session.run().await;
                drop(registration);
                report
            }
            .instrument(info_span!("session_task", session_id = %id)),
        )
    }
}

/// Drives admission for one connection and logs the outcome.
pub async fn admit_logged<C: PeerChannel>(lobby: Arc<Lobby<C>>, channel: C) {
    match lobby.admit(channel).await {
        Ok(Some(_)) => debug!("Session launched"),
        Ok(None) => debug!("Peer waiting for opponent"),
        Err(err) => warn!(error = %err, "Connection dropped during admission"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LineChannel;
    use crate::session::SessionStatus;
    use crate::sink::MatchResult;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};

    type TestChannel = LineChannel<WriteHalf<DuplexStream>>;

    #[derive(Default)]
    struct RecordingSink {
        results: std::sync::Mutex<Vec<MatchResult>>,
    }

    impl ResultSink for RecordingSink {
        fn record(&self, result: MatchResult) {
            self.results.lock().unwrap().push(result);
        }
    }

    struct Client {
        lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn say(&mut self, text: &str) {
            self.writer
                .write_all(format!("{}\n", text).as_bytes())
                .await
                .unwrap();
        }

        /// Reads until a line containing `needle`, returning every line read.
        async fn expect(&mut self, needle: &str) -> Vec<String> {
            let mut seen = Vec::new();
            loop {
                let line = self.lines.next_line().await.unwrap().unwrap();
                let found = line.contains(needle);
                seen.push(line);
                if found {
                    return seen;
                }
            }
        }
    }

    fn connect() -> (TestChannel, Client) {
        let (server, client) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);
        (
            LineChannel::new(server_read, server_write),
            Client {
                lines: BufReader::new(client_read).lines(),
                writer: client_write,
            },
        )
    }

    fn lobby(sink: Arc<RecordingSink>) -> Arc<Lobby<TestChannel>> {
        Arc::new(Lobby::new(
            SessionRegistry::new(),
            sink,
            SessionSettings::new(Duration::from_secs(10), None),
            Duration::from_secs(5),
            Some(3),
        ))
    }

    #[tokio::test]
    async fn test_first_peer_waits_second_starts_match() {
        let sink = Arc::new(RecordingSink::default());
        let lobby = lobby(sink.clone());
        let (alice_channel, mut alice) = connect();
        let (bob_channel, mut bob) = connect();

        alice.say("alice").await;
        assert!(lobby.admit(alice_channel).await.unwrap().is_none());
        alice.expect("Enter your nickname").await;
        alice.expect("Waiting for an opponent").await;
        assert_eq!(lobby.matchmaker().waiting_count(), 1);

        bob.say("bob").await;
        let handle = lobby.admit(bob_channel).await.unwrap().unwrap();
        assert_eq!(lobby.registry().len(), 1);

        alice.expect("Your opponent is bob. You play X.").await;
        let greeting = bob.expect("Your opponent is alice. You play O.").await;
        assert_eq!(
            greeting,
            vec![
                "Enter your nickname:".to_string(),
                "Your opponent is alice. You play O.".to_string()
            ]
        );

        for (x, o) in [("1", Some("2")), ("4", Some("5")), ("7", None)] {
            alice.expect("Your move (X)").await;
            alice.say(x).await;
            if let Some(o) = o {
                bob.expect("Your move (O)").await;
                bob.say(o).await;
            }
        }

        let report = handle.await.unwrap();
        assert_eq!(*report.status(), SessionStatus::Won(arena_tictactoe::Player::X));
        assert_eq!(report.id(), "match-1");
        assert!(lobby.registry().is_empty());
        assert_eq!(sink.results.lock().unwrap()[0].winner(), Some("alice"));
    }

    #[tokio::test]
    async fn test_silent_client_is_turned_away() {
        let sink = Arc::new(RecordingSink::default());
        let lobby = Arc::new(Lobby::new(
            SessionRegistry::new(),
            sink as Arc<dyn ResultSink>,
            SessionSettings::default(),
            Duration::from_millis(20),
            None,
        ));
        let (channel, _client) = connect();

        let err = lobby.admit(channel).await.unwrap_err();
        assert_eq!(err, ChannelError::Timeout);
        assert_eq!(lobby.matchmaker().waiting_count(), 0);
    }

    #[tokio::test]
    async fn test_only_the_lone_peer_is_told_to_wait() {
        let sink = Arc::new(RecordingSink::default());
        let lobby = lobby(sink);
        let (carol_channel, mut carol) = connect();
        let (dave_channel, mut dave) = connect();
        carol.say("carol").await;
        dave.say("dave").await;

        let (carol_admitted, dave_admitted) =
            tokio::join!(lobby.admit(carol_channel), lobby.admit(dave_channel));
        let carol_admitted = carol_admitted.unwrap();
        let dave_admitted = dave_admitted.unwrap();
        assert_ne!(carol_admitted.is_some(), dave_admitted.is_some());

        let carol_seen = carol.expect("Your opponent is dave").await;
        let dave_seen = dave.expect("Your opponent is carol").await;
        let waited: Vec<&Vec<String>> = [&carol_seen, &dave_seen]
            .into_iter()
            .filter(|seen| seen.iter().any(|line| line.contains("Waiting for an opponent")))
            .collect();
        assert_eq!(waited.len(), 1);
        assert_eq!(waited[0].len(), 3);
        assert_eq!(waited[0][1], "Waiting for an opponent...");
    }
}
