//! Connection directory for the relay
//!
//! Tracks every open relay connection by its [`ConnectionId`], enforces the
//! peer capacity and resolves routing targets to concrete outgoing queues.
//! The directory holds no game state; it only knows who is connected.

use log::{debug, info};
use shared::{ConnectionId, Target};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Encoded frame shared between all recipients of a broadcast
pub type Frame = Arc<Vec<u8>>;

/// One open connection
#[derive(Debug)]
pub struct Peer {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Outgoing queue drained by the connection's writer task
    sender: mpsc::UnboundedSender<Frame>,
    reader: Option<JoinHandle<()>>,
}

impl Peer {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
            reader: None,
        }
    }

    pub fn set_reader(&mut self, reader: JoinHandle<()>) {
        self.reader = Some(reader);
    }

    /// Queues a frame; false if the writer is already gone
    pub fn send(&self, frame: Frame) -> bool {
        self.sender.send(frame).is_ok()
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Stops reading. Dropping the peer afterwards lets the writer flush and
    /// shut the socket down.
    pub fn stop_reading(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

pub struct SessionDirectory {
    peers: HashMap<ConnectionId, Peer>,
    max_peers: usize,
}

impl SessionDirectory {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
        }
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }

    /// Registers a connection. Hands the peer back if the relay is full.
    pub fn attach(&mut self, peer: Peer) -> Result<(), Peer> {
        if self.is_full() {
            return Err(peer);
        }
        info!("Connection {} attached from {}", peer.id, peer.addr);
        self.peers.insert(peer.id.clone(), peer);
        Ok(())
    }

    pub fn detach(&mut self, id: &ConnectionId) -> Option<Peer> {
        let peer = self.peers.remove(id)?;
        info!(
            "Connection {} detached after {:.1}s",
            peer.id,
            peer.uptime().as_secs_f32()
        );
        Some(peer)
    }

    /// Removes every connection, for shutdown
    pub fn drain(&mut self) -> Vec<Peer> {
        self.peers.drain().map(|(_, peer)| peer).collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// Connection ids in a stable order
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Peers a message for `target` should be delivered to.
    ///
    /// A single target that is no longer connected resolves to nobody.
    pub fn recipients(&self, target: &Target) -> Vec<&Peer> {
        match target {
            Target::Single(id) => match self.peers.get(id) {
                Some(peer) => vec![peer],
                None => {
                    debug!("No connection {}, dropping message", id);
                    Vec::new()
                }
            },
            _ => self.peers.values().filter(|peer| target.includes(&peer.id)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
