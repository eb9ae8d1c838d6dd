//! Peer channels: how a session talks to one connected client.
//!
//! Session logic only sees [`PeerChannel`]; framing and transport live in
//! the implementations.

mod line;

pub use line::{BoxedWriter, INBOUND_CAPACITY, LineChannel, MAX_LINE_LENGTH, NetChannel};

use async_trait::async_trait;
use derive_getters::Getters;
use derive_more::{Display, Error};
use std::time::Duration;

/// Failure tag returned by channel operations.
///
/// The turn loop branches on this tag, never on I/O error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum ChannelError {
    /// No message arrived before the deadline.
    #[display("Timed out waiting for peer")]
    Timeout,
    /// The peer closed the connection or the connection failed.
    #[display("Peer disconnected")]
    Disconnected,
}

/// Bidirectional text channel to a single client.
#[async_trait]
pub trait PeerChannel: Send + 'static {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Disconnected`] if the peer is gone.
    async fn send(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Waits up to `deadline` for the next message from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] when the deadline passes first and
    /// [`ChannelError::Disconnected`] once the peer is gone and no buffered
    /// message remains.
    async fn receive(&mut self, deadline: Duration) -> Result<String, ChannelError>;

    /// Returns true once the peer has closed its side of the connection.
    fn is_closed(&self) -> bool;

    /// Closes the channel from the server side.
    async fn close(&mut self);
}

/// A connected client with its nickname.
///
/// Owned by the matchmaker queue until paired, then by exactly one session.
#[derive(Debug, Getters)]
pub struct Peer<C> {
    /// Nickname supplied at connect time.
    nickname: String,
    /// Channel to the client.
    #[getter(skip)]
    channel: C,
}

impl<C: PeerChannel> Peer<C> {
    /// Creates a peer from a nickname and its channel.
    pub fn new(nickname: impl Into<String>, channel: C) -> Self {
        Self {
            nickname: nickname.into(),
            channel,
        }
    }

    /// Mutable access to the channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Returns true once the client has disconnected.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
