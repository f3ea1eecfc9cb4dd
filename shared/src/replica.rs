//! Client side of the synchronization protocol
//!
//! A client holds a replica of the host's doors and roster. The replica is
//! only ever written by host-originated messages: local interaction produces
//! a `door-update` request and the door changes when the host's confirmation
//! comes back.

use crate::doors::DoorSet;
use crate::protocol::{ConnectionId, Inbound, PlayerInfo, PlayerState, TransportEvent, WireMessage};
use crate::world::{DoorSave, Position, Roster};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Idle,
    Connecting,
    Joining,
    Synced,
    Disconnected,
}

/// What the surrounding application should do after an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEffect {
    None,
    /// The session is over; go back to a non-session view
    ReturnToMenu,
}

#[derive(Debug, Clone)]
pub struct ReplicaEngine {
    phase: ClientPhase,
    self_id: Option<ConnectionId>,
    name: String,
    position: Position,
    doors: DoorSet,
    peers: Roster,
}

impl ReplicaEngine {
    pub fn new(name: &str, position: Position, doors: DoorSet) -> Self {
        Self {
            phase: ClientPhase::Idle,
            self_id: None,
            name: name.to_string(),
            position,
            doors,
            peers: Roster::new(),
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn self_id(&self) -> Option<&ConnectionId> {
        self.self_id.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn doors(&self) -> &DoorSet {
        &self.doors
    }

    pub fn peers(&self) -> &Roster {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut Roster {
        &mut self.peers
    }

    pub fn begin_connect(&mut self) {
        if self.phase == ClientPhase::Idle {
            self.phase = ClientPhase::Connecting;
        }
    }

    /// Dial failed; the session never starts
    pub fn connect_failed(&mut self) {
        if self.phase == ClientPhase::Connecting {
            self.phase = ClientPhase::Disconnected;
        }
    }

    /// Transport is up with the relay-assigned `id`.
    ///
    /// Returns the `player-joined` announcement to send to the host.
    pub fn connected(&mut self, id: ConnectionId) -> Option<WireMessage> {
        if self.phase != ClientPhase::Connecting {
            warn!("Connected while {:?}, ignoring", self.phase);
            return None;
        }
        info!("Connected to host as {}", id);
        self.self_id = Some(id.clone());
        self.phase = ClientPhase::Joining;
        Some(WireMessage::PlayerJoined {
            socket_id: Some(id),
            player_info: PlayerInfo {
                name: self.name.clone(),
                x: self.position.x,
                y: self.position.y,
            },
        })
    }

    pub fn handle(&mut self, inbound: Inbound) -> ClientEffect {
        match (self.phase, inbound) {
            (ClientPhase::Disconnected, _) | (ClientPhase::Idle, _) => ClientEffect::None,
            (_, Inbound::Transport(TransportEvent::HostDisconnected)) => {
                warn!("Lost connection to host");
                self.disconnect();
                ClientEffect::ReturnToMenu
            }
            (_, Inbound::Transport(TransportEvent::PeerDisconnected)) => ClientEffect::None,
            (ClientPhase::Joining | ClientPhase::Synced, Inbound::Wire(WireMessage::FullWorldState { doors, players })) => {
                self.apply_full_state(&doors, &players);
                ClientEffect::None
            }
            (ClientPhase::Synced, Inbound::Wire(message)) => {
                self.apply_incremental(message);
                ClientEffect::None
            }
            (phase, Inbound::Wire(message)) => {
                debug!("Ignoring {} while {:?}", message.kind(), phase);
                ClientEffect::None
            }
        }
    }

    /// Replaces doors and peers wholesale with the host's snapshot
    fn apply_full_state(&mut self, doors: &[DoorSave], players: &[PlayerState]) {
        self.doors.replace_states(doors);
        self.peers.clear();
        let me = self.self_id.clone();
        for player in players.iter().filter(|p| me.as_ref() != Some(&p.socket_id)) {
            self.peers.upsert_state(player);
        }
        if self.phase != ClientPhase::Synced {
            info!(
                "Synced with host: {} doors, {} other players",
                self.doors.len(),
                self.peers.len()
            );
        }
        self.phase = ClientPhase::Synced;
    }

    fn apply_incremental(&mut self, message: WireMessage) {
        match message {
            WireMessage::StateUpdate { players, doors } => {
                for player in players.iter().flatten() {
                    if !self.is_me(&player.socket_id) {
                        self.peers.upsert_state(player);
                    }
                }
                if let Some(doors) = doors {
                    self.doors.apply_states(&doors);
                }
            }
            WireMessage::DoorUpdate { door_id, is_open } => match self.doors.index_of(door_id) {
                Some(id) => {
                    self.doors.apply(id, is_open);
                }
                None => debug!("Ignoring door-update for unknown door {}", door_id),
            },
            WireMessage::PlayerLeft { socket_id } => {
                if let Some(player) = self.peers.remove(&socket_id) {
                    info!("Player '{}' left", player.name);
                }
            }
            other => debug!("Client ignoring {}", other.kind()),
        }
    }

    fn is_me(&self, id: &ConnectionId) -> bool {
        self.self_id.as_ref() == Some(id)
    }

    fn disconnect(&mut self) {
        self.phase = ClientPhase::Disconnected;
        self.self_id = None;
        self.peers.clear();
        self.doors = DoorSet::default();
    }

    pub fn move_to(&mut self, position: Position) {
        if !position.is_finite() {
            warn!("Ignoring move to a non-finite position");
            return;
        }
        self.position = position;
    }

    /// Position push for the periodic timer; only once the host knows us
    pub fn position_update(&self) -> Option<WireMessage> {
        match self.phase {
            ClientPhase::Joining | ClientPhase::Synced => Some(WireMessage::PlayerUpdate {
                name: self.name.clone(),
                x: self.position.x,
                y: self.position.y,
            }),
            _ => None,
        }
    }

    /// Request to flip a door; local state is untouched until the host echoes
    pub fn request_toggle(&self, id: usize) -> Option<WireMessage> {
        if self.phase != ClientPhase::Synced {
            return None;
        }
        let door = self.doors.get(id)?;
        Some(WireMessage::DoorUpdate {
            door_id: id as i64,
            is_open: !door.is_open(),
        })
    }

    /// Requests a flip of the closest door within `radius`
    pub fn interact(&self, radius: f32) -> Option<WireMessage> {
        let door = self.doors.closest(&self.position, radius)?;
        self.request_toggle(door.id())
    }

    /// Leaves the session. Safe to call repeatedly.
    pub fn depart(&mut self) -> bool {
        if self.phase == ClientPhase::Disconnected {
            return false;
        }
        info!("Leaving session");
        self.disconnect();
        true
    }
}
