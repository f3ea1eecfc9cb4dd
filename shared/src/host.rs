//! Host side of the synchronization protocol
//!
//! The host owns the canonical [`WorldState`], the canonical door states and
//! the roster of attached peers. Inbound relay traffic is applied in receipt
//! order, which makes that order the single total order every peer converges
//! to. The engine does no I/O of its own apart from best-effort saves through
//! the [`WorldStore`]; everything destined for peers is returned as
//! [`Outbound`] values for the relay to route.

use crate::doors::DoorSet;
use crate::protocol::{ConnectionId, Inbound, PlayerInfo, PlayerState, TransportEvent, WireMessage};
use crate::store::WorldStore;
use crate::world::{Position, Roster, RuntimePlayer, WorldState};
use log::{debug, error, info, warn};

/// Who an outbound message is routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every open connection
    All,
    /// Every open connection except `exclude`, when given
    Broadcast { exclude: Option<ConnectionId> },
    /// One connection; dropped silently if it is gone
    Single(ConnectionId),
}

impl Target {
    pub fn broadcast_except(id: &ConnectionId) -> Self {
        Target::Broadcast {
            exclude: Some(id.clone()),
        }
    }

    pub fn includes(&self, id: &ConnectionId) -> bool {
        match self {
            Target::All => true,
            Target::Broadcast { exclude } => exclude.as_ref() != Some(id),
            Target::Single(target) => target == id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub message: WireMessage,
}

impl Outbound {
    pub fn new(target: Target, message: WireMessage) -> Self {
        Self { target, message }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Idle,
    Listening,
    Active,
    ShuttingDown,
}

pub struct HostEngine {
    phase: HostPhase,
    slot: usize,
    world: WorldState,
    doors: DoorSet,
    me: RuntimePlayer,
    peers: Roster,
    store: Box<dyn WorldStore + Send>,
}

impl HostEngine {
    pub fn new(
        slot: usize,
        world: WorldState,
        doors: DoorSet,
        self_id: ConnectionId,
        name: &str,
        spawn: Position,
        store: Box<dyn WorldStore + Send>,
    ) -> Self {
        if doors.len() != world.doors.len() && !world.doors.is_empty() {
            warn!(
                "World '{}' saved {} doors but the map declares {}",
                world.world_name,
                world.doors.len(),
                doors.len()
            );
        }
        Self {
            phase: HostPhase::Idle,
            slot,
            world,
            doors,
            me: RuntimePlayer::new(self_id, name, spawn),
            peers: Roster::new(),
            store,
        }
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn doors(&self) -> &DoorSet {
        &self.doors
    }

    pub fn peers(&self) -> &Roster {
        &self.peers
    }

    pub fn me(&self) -> &RuntimePlayer {
        &self.me
    }

    pub fn self_id(&self) -> &ConnectionId {
        &self.me.connection_id
    }

    /// The relay is bound and accepting connections
    pub fn listening(&mut self) {
        if self.phase == HostPhase::Idle {
            self.phase = HostPhase::Listening;
            info!("Hosting world '{}' (slot {})", self.world.world_name, self.slot);
        }
    }

    /// The local session is up; from here on peer traffic is applied
    pub fn activate(&mut self) {
        if self.phase == HostPhase::Listening {
            self.phase = HostPhase::Active;
            info!("Host '{}' is active as {}", self.me.name, self.me.connection_id);
        }
    }

    /// Applies one inbound envelope from `from`
    pub fn handle(&mut self, from: &ConnectionId, inbound: Inbound) -> Vec<Outbound> {
        if self.phase != HostPhase::Active {
            debug!("Host not active ({:?}), ignoring input from {}", self.phase, from);
            return Vec::new();
        }
        if let Inbound::Wire(message) = &inbound {
            if !message.has_finite_coordinates() {
                warn!("Dropping {} from {} with a non-finite coordinate", message.kind(), from);
                return Vec::new();
            }
        }

        match inbound {
            Inbound::Wire(WireMessage::PlayerJoined { player_info, .. }) => {
                self.player_joined(from, player_info)
            }
            Inbound::Wire(WireMessage::PlayerUpdate { name, x, y }) => {
                self.player_update(from, &name, Position::new(x, y))
            }
            Inbound::Wire(WireMessage::DoorUpdate { door_id, is_open }) => {
                self.door_request(from, door_id, is_open)
            }
            Inbound::Wire(WireMessage::PlayerLeft { .. })
            | Inbound::Transport(TransportEvent::PeerDisconnected) => self.player_left(from),
            Inbound::Wire(other) => {
                debug!("Host ignoring {} from {}", other.kind(), from);
                Vec::new()
            }
            Inbound::Transport(TransportEvent::HostDisconnected) => Vec::new(),
        }
    }

    fn player_joined(&mut self, from: &ConnectionId, info: PlayerInfo) -> Vec<Outbound> {
        let is_new = self.peers.upsert(from, &info.name, info.position());
        if is_new {
            info!("Player '{}' joined as {}", info.name, from);
        } else {
            debug!("Player {} re-announced itself, re-sending world state", from);
        }

        let joined = self.peer_state(from);
        vec![
            Outbound::new(Target::Single(from.clone()), self.full_world_state()),
            Outbound::new(
                Target::broadcast_except(from),
                WireMessage::StateUpdate {
                    players: Some(joined.into_iter().collect()),
                    doors: None,
                },
            ),
        ]
    }

    fn player_update(&mut self, from: &ConnectionId, name: &str, position: Position) -> Vec<Outbound> {
        self.peers.upsert(from, name, position);
        let updated = self.peer_state(from);
        vec![Outbound::new(
            Target::broadcast_except(from),
            WireMessage::StateUpdate {
                players: Some(updated.into_iter().collect()),
                doors: None,
            },
        )]
    }

    fn door_request(&mut self, from: &ConnectionId, door_id: i64, is_open: bool) -> Vec<Outbound> {
        let Some(id) = self.doors.index_of(door_id) else {
            warn!(
                "Ignoring door-update for unknown door {} from {} ({} doors)",
                door_id,
                from,
                self.doors.len()
            );
            return Vec::new();
        };

        self.doors.apply(id, is_open);
        debug!("Door {} set to {} by {}", id, if is_open { "open" } else { "closed" }, from);
        vec![Outbound::new(
            Target::All,
            WireMessage::DoorUpdate { door_id, is_open },
        )]
    }

    fn player_left(&mut self, from: &ConnectionId) -> Vec<Outbound> {
        let Some(player) = self.peers.remove(from) else {
            debug!("Connection {} left without joining", from);
            return Vec::new();
        };

        let name = player.save_name();
        info!(
            "Player '{}' left at ({:.1}, {:.1})",
            name, player.position.x, player.position.y
        );
        self.world.fold_player(&name, player.position);
        self.persist();

        vec![Outbound::new(
            Target::All,
            WireMessage::PlayerLeft {
                socket_id: from.clone(),
            },
        )]
    }

    fn peer_state(&self, id: &ConnectionId) -> Option<PlayerState> {
        self.peers.get(id).map(RuntimePlayer::to_state)
    }

    /// Every player in the session, host first
    pub fn player_states(&self) -> Vec<PlayerState> {
        let mut players = vec![self.me.to_state()];
        players.extend(self.peers.states());
        players
    }

    pub fn full_world_state(&self) -> WireMessage {
        WireMessage::FullWorldState {
            doors: self.doors.states(),
            players: self.player_states(),
        }
    }

    /// Periodic full broadcast; nothing when no peer is attached
    pub fn snapshot(&self) -> Option<Outbound> {
        if self.phase != HostPhase::Active || self.peers.is_empty() {
            return None;
        }
        Some(Outbound::new(
            Target::All,
            WireMessage::StateUpdate {
                players: Some(self.player_states()),
                doors: Some(self.doors.states()),
            },
        ))
    }

    pub fn move_self(&mut self, position: Position) {
        if !position.is_finite() {
            warn!("Ignoring move to a non-finite position");
            return;
        }
        self.me.position = position;
    }

    /// Applies a door change made by the host player.
    ///
    /// Canonical state changes immediately; peers get the confirmation.
    pub fn set_door(&mut self, id: usize, is_open: bool) -> Vec<Outbound> {
        if !self.doors.apply(id, is_open) {
            warn!("Host tried to change unknown door {}", id);
            return Vec::new();
        }
        if self.phase != HostPhase::Active {
            return Vec::new();
        }
        vec![Outbound::new(
            Target::All,
            WireMessage::DoorUpdate {
                door_id: id as i64,
                is_open,
            },
        )]
    }

    pub fn toggle_door(&mut self, id: usize) -> Vec<Outbound> {
        match self.doors.get(id) {
            Some(door) => {
                let next = !door.is_open();
                self.set_door(id, next)
            }
            None => {
                warn!("Host tried to toggle unknown door {}", id);
                Vec::new()
            }
        }
    }

    /// Toggles the closest door within `radius` of the host player
    pub fn interact(&mut self, radius: f32) -> Vec<Outbound> {
        let closest = self.doors.closest(&self.me.position, radius).map(|d| d.id());
        match closest {
            Some(id) => self.toggle_door(id),
            None => {
                debug!("No door within reach of the host");
                Vec::new()
            }
        }
    }

    /// Folds every live position and the door array into the world record
    fn flush(&mut self) {
        let me = self.me.save_name();
        self.world.fold_player(&me, self.me.position);
        for peer in self.peers.iter() {
            self.world.fold_player(&peer.save_name(), peer.position);
        }
        self.world.doors = self.doors.states();
    }

    fn persist(&mut self) {
        self.world.doors = self.doors.states();
        match self.store.save_world_data(self.slot, &self.world) {
            Ok(()) => debug!("World '{}' saved to slot {}", self.world.world_name, self.slot),
            Err(e) => error!("Failed to save world '{}': {}", self.world.world_name, e),
        }
    }

    /// Explicit save
    pub fn save(&mut self) {
        self.flush();
        self.persist();
        info!("World '{}' saved", self.world.world_name);
    }

    /// Flushes and persists once; later calls are no-ops.
    ///
    /// Returns true the first time. Closing the relay is the caller's job.
    pub fn depart(&mut self) -> bool {
        if self.phase == HostPhase::ShuttingDown {
            return false;
        }
        if self.phase != HostPhase::Idle {
            self.save();
        }
        self.phase = HostPhase::ShuttingDown;
        info!("Host shutting down");
        true
    }
}
