//! One running session, whatever its role
//!
//! [`Session`] is the tagged union of the three roles. Each role has its own
//! engine and its own handling; the runtimes only ever see [`Effect`]s and
//! turn them into I/O.

use crate::doors::DoorSet;
use crate::host::{HostEngine, Outbound};
use crate::protocol::{ConnectionId, Inbound, WireMessage};
use crate::replica::{ClientEffect, ReplicaEngine};
use crate::solo::SoloEngine;
use crate::world::Position;
use crate::INTERACT_RADIUS;
use log::{debug, info};

/// Input from the local player
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCommand {
    Move { x: f32, y: f32 },
    Interact,
    ToggleDoor(usize),
    Save,
    Depart,
}

/// What a front end can ask of a running session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Local(LocalCommand),
    /// Print who is in the session
    Who,
}

impl From<LocalCommand> for Command {
    fn from(command: LocalCommand) -> Self {
        Command::Local(command)
    }
}

/// I/O the runtime has to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Host only: hand to the relay for routing
    Route(Outbound),
    /// Client only: send to the host
    SendToHost(WireMessage),
    /// The session ended; leave to the menu
    ReturnToMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
    Solo,
}

pub enum Session {
    Host(HostEngine),
    Client(ReplicaEngine),
    Solo(SoloEngine),
}

fn routed(outbound: Vec<Outbound>) -> Vec<Effect> {
    outbound.into_iter().map(Effect::Route).collect()
}

fn to_host(message: Option<WireMessage>) -> Vec<Effect> {
    message.into_iter().map(Effect::SendToHost).collect()
}

impl Session {
    pub fn role(&self) -> Role {
        match self {
            Session::Host(_) => Role::Host,
            Session::Client(_) => Role::Client,
            Session::Solo(_) => Role::Solo,
        }
    }

    pub fn as_host(&self) -> Option<&HostEngine> {
        match self {
            Session::Host(host) => Some(host),
            _ => None,
        }
    }

    pub fn as_host_mut(&mut self) -> Option<&mut HostEngine> {
        match self {
            Session::Host(host) => Some(host),
            _ => None,
        }
    }

    pub fn as_client(&self) -> Option<&ReplicaEngine> {
        match self {
            Session::Client(client) => Some(client),
            _ => None,
        }
    }

    pub fn as_client_mut(&mut self) -> Option<&mut ReplicaEngine> {
        match self {
            Session::Client(client) => Some(client),
            _ => None,
        }
    }

    pub fn as_solo(&self) -> Option<&SoloEngine> {
        match self {
            Session::Solo(solo) => Some(solo),
            _ => None,
        }
    }

    /// One line per player plus the door summary, for the console
    pub fn describe(&self) -> Vec<String> {
        fn line(name: &str, position: Position, note: &str) -> String {
            format!("{:<16} ({:>7.1}, {:>7.1}){}", name, position.x, position.y, note)
        }
        fn doors_line(doors: &DoorSet) -> String {
            let open = doors.iter().filter(|d| d.is_open()).count();
            format!("doors: {} open of {}", open, doors.len())
        }

        let mut lines = Vec::new();
        match self {
            Session::Host(host) => {
                lines.push(line(&host.me().name, host.me().position, " [host, you]"));
                for peer in host.peers().iter() {
                    lines.push(line(&peer.name, peer.position, ""));
                }
                lines.push(doors_line(host.doors()));
            }
            Session::Client(client) => {
                lines.push(line(client.name(), client.position(), " [you]"));
                for peer in client.peers().iter() {
                    lines.push(line(&peer.name, peer.display_position, ""));
                }
                lines.push(doors_line(client.doors()));
            }
            Session::Solo(solo) => {
                lines.push(line(solo.name(), solo.position(), " [solo]"));
                lines.push(doors_line(solo.doors()));
            }
        }
        lines
    }

    /// Applies remote input. `from` is the sending connection on the host.
    pub fn handle_remote(&mut self, from: Option<&ConnectionId>, inbound: Inbound) -> Vec<Effect> {
        match self {
            Session::Host(host) => match from {
                Some(from) => routed(host.handle(from, inbound)),
                None => {
                    debug!("Host received input without a sender, dropping");
                    Vec::new()
                }
            },
            Session::Client(client) => match client.handle(inbound) {
                ClientEffect::ReturnToMenu => vec![Effect::ReturnToMenu],
                ClientEffect::None => Vec::new(),
            },
            Session::Solo(_) => Vec::new(),
        }
    }

    pub fn apply_local(&mut self, command: &LocalCommand) -> Vec<Effect> {
        match (self, command) {
            (session, LocalCommand::Depart) => session.depart(),

            (Session::Host(host), LocalCommand::Move { x, y }) => {
                host.move_self(Position::new(*x, *y));
                Vec::new()
            }
            (Session::Host(host), LocalCommand::Interact) => routed(host.interact(INTERACT_RADIUS)),
            (Session::Host(host), LocalCommand::ToggleDoor(id)) => routed(host.toggle_door(*id)),
            (Session::Host(host), LocalCommand::Save) => {
                host.save();
                Vec::new()
            }

            (Session::Client(client), LocalCommand::Move { x, y }) => {
                client.move_to(Position::new(*x, *y));
                Vec::new()
            }
            (Session::Client(client), LocalCommand::Interact) => {
                to_host(client.interact(INTERACT_RADIUS))
            }
            (Session::Client(client), LocalCommand::ToggleDoor(id)) => {
                to_host(client.request_toggle(*id))
            }
            (Session::Client(_), LocalCommand::Save) => {
                info!("Only the host can save the world");
                Vec::new()
            }

            (Session::Solo(solo), LocalCommand::Move { x, y }) => {
                solo.move_to(Position::new(*x, *y));
                Vec::new()
            }
            (Session::Solo(solo), LocalCommand::Interact) => {
                solo.interact(INTERACT_RADIUS);
                Vec::new()
            }
            (Session::Solo(solo), LocalCommand::ToggleDoor(id)) => {
                solo.toggle_door(*id);
                Vec::new()
            }
            (Session::Solo(solo), LocalCommand::Save) => {
                solo.save();
                Vec::new()
            }
        }
    }

    /// Periodic traffic for the broadcast timer
    pub fn periodic(&mut self) -> Vec<Effect> {
        match self {
            Session::Host(host) => host.snapshot().map(Effect::Route).into_iter().collect(),
            Session::Client(client) => to_host(client.position_update()),
            Session::Solo(_) => Vec::new(),
        }
    }

    /// Smooths displayed positions of remote players
    pub fn advance_frame(&mut self) {
        if let Session::Client(client) = self {
            client.peers_mut().smooth_all();
        }
    }

    /// Leaves the session; idempotent
    pub fn depart(&mut self) -> Vec<Effect> {
        let first = match self {
            Session::Host(host) => host.depart(),
            Session::Client(client) => client.depart(),
            Session::Solo(solo) => solo.depart(),
        };
        if first {
            vec![Effect::ReturnToMenu]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doors::{Direction, RuntimeDoor};
    use crate::host::Target;
    use crate::protocol::{decode, Decoded, PlayerInfo, TransportEvent};
    use crate::store::MemoryStore;
    use crate::world::{DoorSave, WorldState};

    fn one_door() -> DoorSet {
        DoorSet::new(vec![RuntimeDoor::new(0, Direction::Left, Position::new(0.0, 0.0), false)])
    }

    fn host_session(store: &MemoryStore) -> Session {
        let mut world = WorldState::new("w");
        world.doors = vec![DoorSave::default()];
        let mut host = HostEngine::new(
            0,
            world,
            one_door(),
            ConnectionId::from("host"),
            "Host",
            Position::new(0.0, 0.0),
            Box::new(store.clone()),
        );
        host.listening();
        host.activate();
        Session::Host(host)
    }

    fn feed(session: &mut Session, from: &str, raw: &[u8]) -> Vec<Effect> {
        match decode(raw) {
            Decoded::Message(message) => {
                session.handle_remote(Some(&ConnectionId::from(from)), Inbound::Wire(message))
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_solo_toggle_is_synchronous_and_silent() {
        let store = MemoryStore::new();
        let mut session = Session::Solo(SoloEngine::new(
            0,
            WorldState::new("w"),
            one_door(),
            "Me",
            Position::default(),
            Box::new(store),
        ));

        let effects = session.apply_local(&LocalCommand::ToggleDoor(0));
        assert!(effects.is_empty());
        assert!(session.as_solo().unwrap().doors().get(0).unwrap().is_open());
        assert!(session.periodic().is_empty());
        assert_eq!(session.role(), Role::Solo);
    }

    #[test]
    fn test_bogus_envelope_leaves_host_unchanged() {
        let store = MemoryStore::new();
        let mut session = host_session(&store);
        let before = session.as_host().unwrap().world().clone();

        assert!(feed(&mut session, "a", br#"{"type":"bogus"}"#).is_empty());
        assert!(feed(&mut session, "a", br#"{"doorId":0,"isOpen":true}"#).is_empty());

        let host = session.as_host().unwrap();
        assert_eq!(host.world(), &before);
        assert!(!host.doors().get(0).unwrap().is_open());
    }

    #[test]
    fn test_host_interact_routes_to_all() {
        let store = MemoryStore::new();
        let mut session = host_session(&store);
        let effects = session.apply_local(&LocalCommand::Interact);
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Route(outbound) => {
                assert_eq!(outbound.target, Target::All);
                assert_eq!(
                    outbound.message,
                    WireMessage::DoorUpdate { door_id: 0, is_open: true }
                );
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_client_interact_sends_request_only() {
        let mut client = ReplicaEngine::new("Me", Position::new(0.0, 0.0), one_door());
        client.begin_connect();
        client.connected(ConnectionId::from("me"));
        let mut session = Session::Client(client);
        session.handle_remote(
            None,
            Inbound::Wire(WireMessage::FullWorldState {
                doors: vec![DoorSave::default()],
                players: vec![],
            }),
        );

        let effects = session.apply_local(&LocalCommand::Interact);
        assert_eq!(
            effects,
            vec![Effect::SendToHost(WireMessage::DoorUpdate { door_id: 0, is_open: true })]
        );
        assert!(!session.as_client().unwrap().doors().get(0).unwrap().is_open());
        assert!(session.apply_local(&LocalCommand::Save).is_empty());
    }

    #[test]
    fn test_client_host_disconnect_returns_to_menu() {
        let mut client = ReplicaEngine::new("Me", Position::default(), DoorSet::default());
        client.begin_connect();
        client.connected(ConnectionId::from("me"));
        let mut session = Session::Client(client);
        let effects = session.handle_remote(None, Inbound::Transport(TransportEvent::HostDisconnected));
        assert_eq!(effects, vec![Effect::ReturnToMenu]);
    }

    #[test]
    fn test_depart_is_idempotent_for_every_role() {
        let store = MemoryStore::new();
        let mut host = host_session(&store);
        assert_eq!(host.apply_local(&LocalCommand::Depart), vec![Effect::ReturnToMenu]);
        assert!(host.apply_local(&LocalCommand::Depart).is_empty());
        assert!(store.world(0).is_some());

        let mut client = Session::Client(ReplicaEngine::new("Me", Position::default(), DoorSet::default()));
        assert_eq!(client.depart(), vec![Effect::ReturnToMenu]);
        assert!(client.depart().is_empty());
    }

    #[test]
    fn test_describe_lists_host_and_peers() {
        let store = MemoryStore::new();
        let mut session = host_session(&store);
        feed(
            &mut session,
            "a",
            br#"{"type":"player-joined","playerInfo":{"name":"Alice","x":3,"y":4}}"#,
        );
        let lines = session.describe();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Host"));
        assert!(lines[1].starts_with("Alice"));
        assert_eq!(lines[2], "doors: 0 open of 1");
    }

    #[test]
    fn test_host_periodic_snapshot_after_join() {
        let store = MemoryStore::new();
        let mut session = host_session(&store);
        assert!(session.periodic().is_empty());

        let joined = WireMessage::PlayerJoined {
            socket_id: None,
            player_info: PlayerInfo {
                name: "A".to_string(),
                x: 0.0,
                y: 0.0,
            },
        };
        session.handle_remote(Some(&ConnectionId::from("a")), Inbound::Wire(joined));
        assert_eq!(session.periodic().len(), 1);
    }
}
