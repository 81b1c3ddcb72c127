//! Fixed-capacity table of peers to send to

use ddserver_core::constants::BACKLOG;
use ddserver_core::{kerror, Message};
use ddserver_runtime::Endpoint;

/// Peers a broadcast goes out to, in registration order
pub struct PeerTable {
    peers: Vec<Endpoint>,
    capacity: usize,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::with_capacity(BACKLOG)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a peer; a full table hands the endpoint back
    pub fn add(&mut self, peer: Endpoint) -> Result<usize, Endpoint> {
        if self.is_full() {
            kerror!("Peer table full ({}), dropping {}:{}", self.capacity, peer.host(), peer.port());
            return Err(peer);
        }
        self.peers.push(peer);
        Ok(self.peers.len() - 1)
    }

    /// Send to every peer; returns how many sends went through
    ///
    /// Failures are logged by the endpoint and do not stop the broadcast.
    pub fn broadcast(&self, message: &Message) -> usize {
        self.peers
            .iter()
            .filter(|peer| peer.send(message).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> + '_ {
        self.peers.iter_mut()
    }

    /// Drop peers whose socket has been closed; returns how many went
    pub fn prune(&mut self) -> usize {
        let before = self.peers.len();
        self.peers.retain(Endpoint::is_open);
        before - self.peers.len()
    }

    /// Close every peer socket
    pub fn close_all(&mut self) {
        for peer in &mut self.peers {
            peer.close();
        }
        self.peers.clear();
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}
