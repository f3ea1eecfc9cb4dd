//! Session runtimes for the joining and solo roles
//!
//! Joining drives a [`ReplicaEngine`] over a [`RelayConnection`]: inbound
//! frames are decoded and applied, the local position is pushed every
//! broadcast interval, and remote players are smoothed toward their last
//! reported positions on every frame. Solo play has no transport at all.

use crate::network::{ConnectError, ConnectionEvent, RelayConnection};
use log::{debug, info};
use shared::protocol::decode_logged;
use shared::{
    Command, Effect, Inbound, LocalCommand, ReplicaEngine, Session, SoloEngine, TransportEvent,
    BROADCAST_INTERVAL,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Display smoothing step, roughly 60 frames per second
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The local player left
    Departed,
    /// The host went away
    HostLost,
}

pub struct ClientRuntime {
    connection: RelayConnection,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    session: Session,
}

impl ClientRuntime {
    /// Connects to the relay at `addr` and announces the player.
    ///
    /// On failure the engine is marked disconnected and the error returned.
    pub async fn join(addr: &str, mut engine: ReplicaEngine) -> Result<Self, ConnectError> {
        engine.begin_connect();
        let (connection, events) = match RelayConnection::connect(addr).await {
            Ok(connected) => connected,
            Err(e) => {
                engine.connect_failed();
                return Err(e);
            }
        };

        if let Some(joined) = engine.connected(connection.id().clone()) {
            connection.send(&joined);
        }

        Ok(Self {
            connection,
            events,
            session: Session::Client(engine),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until the player leaves or the host goes away
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> (Session, Exit) {
        let mut broadcast = interval(BROADCAST_INTERVAL);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame = interval(FRAME_INTERVAL);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                event = self.events.recv() => {
                    let inbound = match event {
                        Some(ConnectionEvent::Message(data)) => {
                            match decode_logged(&data, "host") {
                                Some(message) => Inbound::Wire(message),
                                None => continue,
                            }
                        }
                        Some(ConnectionEvent::Closed) | None => {
                            Inbound::Transport(TransportEvent::HostDisconnected)
                        }
                    };
                    let effects = self.session.handle_remote(None, inbound);
                    if self.perform(effects) {
                        break Exit::HostLost;
                    }
                },

                _ = broadcast.tick() => {
                    let effects = self.session.periodic();
                    self.perform(effects);
                },

                _ = frame.tick() => self.session.advance_frame(),

                command = commands.recv() => match command {
                    Some(Command::Local(LocalCommand::Depart)) | None => {
                        self.session.depart();
                        break Exit::Departed;
                    }
                    Some(Command::Local(command)) => {
                        let effects = self.session.apply_local(&command);
                        self.perform(effects);
                    }
                    Some(Command::Who) => print_roster(&self.session),
                },
            }
        };

        self.connection.close();
        info!("Left the session ({:?})", exit);
        (self.session, exit)
    }

    /// Carries out effects; true when the session should end
    fn perform(&mut self, effects: Vec<Effect>) -> bool {
        let mut finished = false;
        for effect in effects {
            match effect {
                Effect::SendToHost(message) => {
                    self.connection.send(&message);
                }
                Effect::ReturnToMenu => finished = true,
                Effect::Route(outbound) => {
                    debug!("Client cannot route {}", outbound.message.kind());
                }
            }
        }
        finished
    }
}

/// Plays offline until the player quits
pub async fn run_solo(engine: SoloEngine, mut commands: mpsc::Receiver<Command>) -> Session {
    let mut session = Session::Solo(engine);
    info!("Playing solo");
    loop {
        match commands.recv().await {
            Some(Command::Local(LocalCommand::Depart)) | None => {
                session.depart();
                break;
            }
            Some(Command::Local(command)) => {
                session.apply_local(&command);
            }
            Some(Command::Who) => print_roster(&session),
        }
    }
    session
}

fn print_roster(session: &Session) {
    for line in session.describe() {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Direction, DoorSave, DoorSet, MemoryStore, Position, RuntimeDoor, WorldState};

    fn doors() -> DoorSet {
        DoorSet::new(vec![
            RuntimeDoor::new(0, Direction::Up, Position::new(0.0, 0.0), false),
            RuntimeDoor::new(1, Direction::Right, Position::new(500.0, 0.0), false),
        ])
    }

    #[tokio::test]
    async fn test_solo_commands_apply_and_save_on_quit() {
        let store = MemoryStore::new();
        let engine = SoloEngine::new(
            2,
            WorldState::new("Offline"),
            doors(),
            "Me",
            Position::new(10.0, 10.0),
            Box::new(store.clone()),
        );

        let (tx, rx) = mpsc::channel(8);
        tx.send(LocalCommand::Interact.into()).await.unwrap();
        tx.send(LocalCommand::Move { x: 490.0, y: 0.0 }.into()).await.unwrap();
        tx.send(LocalCommand::ToggleDoor(1).into()).await.unwrap();
        tx.send(Command::Who).await.unwrap();
        tx.send(LocalCommand::Depart.into()).await.unwrap();

        let session = run_solo(engine, rx).await;
        let solo = session.as_solo().unwrap();
        assert!(solo.doors().iter().all(|d| d.is_open()));

        let saved = store.world(2).unwrap();
        assert_eq!(saved.doors, vec![DoorSave { is_open: true }; 2]);
        assert_eq!(saved.saved_position("Me"), Some(Position::new(490.0, 0.0)));
    }

    #[tokio::test]
    async fn test_solo_ends_when_input_closes() {
        let store = MemoryStore::new();
        let engine = SoloEngine::new(
            0,
            WorldState::new("Offline"),
            DoorSet::default(),
            "Me",
            Position::default(),
            Box::new(store.clone()),
        );
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        run_solo(engine, rx).await;
        assert!(store.world(0).is_some());
    }

    #[tokio::test]
    async fn test_join_unreachable_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let engine = ReplicaEngine::new("Me", Position::default(), DoorSet::default());
        assert!(ClientRuntime::join(&addr, engine).await.is_err());
    }
}
