//! First-come first-served pairing of waiting peers.

use crate::channel::{Peer, PeerChannel};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// Outcome of adding a peer to the queue.
#[derive(Debug)]
pub enum Pairing<C> {
    /// The peer is queued and waits for an opponent.
    Waiting,
    /// The two oldest waiting peers were paired. `first` moves first.
    Paired {
        /// Peer that waited longest; plays X.
        first: Peer<C>,
        /// Peer that arrived next; plays O.
        second: Peer<C>,
    },
}

/// FIFO queue of peers waiting for an opponent.
///
/// Enqueue and pairing happen under one lock, so a peer is never handed
/// out twice.
#[derive(Debug)]
pub struct Matchmaker<C> {
    waiting: Mutex<VecDeque<Peer<C>>>,
}

impl<C> Default for Matchmaker<C> {
    fn default() -> Self {
        Self {
            waiting: Mutex::new(VecDeque::new()),
        }
    }
}

impl<C: PeerChannel> Matchmaker<C> {
    /// Creates an empty matchmaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer and pairs the two oldest waiting peers if possible.
    ///
    /// Peers that disconnected while waiting are dropped first.
    #[instrument(skip_all, fields(nickname = %peer.nickname()))]
    pub fn enqueue(&self, peer: Peer<C>) -> Pairing<C> {
        let mut waiting = self.lock();
        match take_opponent(&mut waiting, peer) {
            Ok((first, second)) => Pairing::Paired { first, second },
            Err(peer) => {
                park_in(&mut waiting, peer);
                Pairing::Waiting
            }
        }
    }

    /// Pairs `peer` with the oldest open waiting peer, or hands it back
    /// untouched when nobody is waiting.
    ///
    /// The caller decides what to tell a returned peer before [`park`]ing it.
    ///
    /// [`park`]: Matchmaker::park
    #[instrument(skip_all, fields(nickname = %peer.nickname()))]
    pub fn pair_with_waiting(&self, peer: Peer<C>) -> Result<(Peer<C>, Peer<C>), Peer<C>> {
        take_opponent(&mut self.lock(), peer)
    }

    /// Queues a peer to wait for an opponent.
    pub fn park(&self, peer: Peer<C>) {
        park_in(&mut self.lock(), peer);
    }

    /// Number of peers currently waiting.
    pub fn waiting_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Peer<C>>> {
        self.waiting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn take_opponent<C: PeerChannel>(
    waiting: &mut VecDeque<Peer<C>>,
    peer: Peer<C>,
) -> Result<(Peer<C>, Peer<C>), Peer<C>> {
    let before = waiting.len();
    waiting.retain(|queued| !queued.is_closed());
    if waiting.len() < before {
        debug!(dropped = before - waiting.len(), "Dropped disconnected waiting peers");
    }

    match waiting.pop_front() {
        Some(first) => {
            info!(
                first = %first.nickname(),
                second = %peer.nickname(),
                "Paired peers"
            );
            Ok((first, peer))
        }
        None => Err(peer),
    }
}

fn park_in<C: PeerChannel>(waiting: &mut VecDeque<Peer<C>>, peer: Peer<C>) {
    waiting.push_back(peer);
    debug!(waiting = waiting.len(), "Peer queued");
}
