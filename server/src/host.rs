//! Host runtime: drives a [`HostEngine`] from relay events, a broadcast timer
//! and local commands.
//!
//! All three sources are multiplexed in one `select!` loop, so the engine is
//! only ever touched from a single task and inbound messages are applied in
//! exactly the order the relay delivered them.

use crate::network::{RelayError, RelayEvent, RelayServer};
use log::{debug, info, warn};
use shared::protocol::decode_logged;
use shared::{
    Command, Effect, HostEngine, Inbound, LocalCommand, Session, TransportEvent,
    BROADCAST_INTERVAL, DEFAULT_PORT,
};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Maximum simultaneous relay connections
pub const DEFAULT_MAX_PEERS: usize = 16;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: String,
    pub port: u16,
    pub max_peers: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

impl HostConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

pub struct HostRuntime {
    relay: RelayServer,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    session: Session,
}

impl HostRuntime {
    /// Binds the relay and activates the engine.
    ///
    /// A bind failure leaves the engine idle and is returned to the caller.
    pub async fn start(config: &HostConfig, mut engine: HostEngine) -> Result<Self, RelayError> {
        let (relay, events) = RelayServer::bind(&config.address(), config.max_peers).await?;
        engine.listening();
        engine.activate();
        Ok(Self {
            relay,
            events,
            session: Session::Host(engine),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until a depart command arrives or the command channel closes.
    ///
    /// Returns the finished session so callers can inspect the final state.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Session {
        let mut broadcast = interval(BROADCAST_INTERVAL);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately
        broadcast.tick().await;

        info!("Host running on {}", self.relay.local_addr());

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Relay stopped delivering events");
                        break;
                    }
                },

                _ = broadcast.tick() => {
                    let effects = self.session.periodic();
                    self.perform(effects).await;
                },

                command = commands.recv() => match command {
                    Some(Command::Local(LocalCommand::Depart)) | None => break,
                    Some(Command::Local(command)) => {
                        let effects = self.session.apply_local(&command);
                        self.perform(effects).await;
                    }
                    Some(Command::Who) => {
                        for line in self.session.describe() {
                            println!("{}", line);
                        }
                    }
                },
            }
        }

        self.shutdown().await;
        self.session
    }

    async fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected { id, addr } => {
                debug!("Connection {} from {} waiting for player-joined", id, addr);
            }
            RelayEvent::Message { from, data } => {
                if let Some(message) = decode_logged(&data, from.as_str()) {
                    let effects = self.session.handle_remote(Some(&from), Inbound::Wire(message));
                    self.perform(effects).await;
                }
            }
            RelayEvent::Disconnected { id } => {
                let effects = self
                    .session
                    .handle_remote(Some(&id), Inbound::Transport(TransportEvent::PeerDisconnected));
                self.perform(effects).await;
            }
        }
    }

    async fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Route(outbound) => {
                    self.relay.route(&outbound.target, &outbound.message).await;
                }
                Effect::SendToHost(message) => {
                    debug!("Host has no host to send {} to", message.kind());
                }
                Effect::ReturnToMenu => {}
            }
        }
    }

    /// Saves, then closes every relay connection
    async fn shutdown(&mut self) {
        self.session.depart();
        self.relay.close_all().await;
        info!("Host stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::framing::{read_frame, write_frame};
    use shared::protocol::{PlayerInfo, RelayControl};
    use shared::{ConnectionId, DoorSave, DoorSet, MemoryStore, Position, WireMessage, WorldState};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn engine(store: &MemoryStore) -> HostEngine {
        let mut world = WorldState::new("Runtime World");
        world.doors = vec![DoorSave::default(); 2];
        let doors = DoorSet::from_saves(&world.doors);
        HostEngine::new(
            0,
            world,
            doors,
            ConnectionId::generate(),
            "Host",
            Position::new(100.0, 100.0),
            Box::new(store.clone()),
        )
    }

    fn local_config() -> HostConfig {
        HostConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_peers: 4,
        }
    }

    async fn next_message(stream: &mut TcpStream) -> WireMessage {
        loop {
            let frame = timeout(Duration::from_secs(2), read_frame(stream))
                .await
                .expect("timed out")
                .unwrap()
                .expect("connection closed");
            if let Some(message) = decode_logged(&frame, "test") {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_config_address() {
        assert_eq!(HostConfig::default().address(), "0.0.0.0:3000");
        assert_eq!(local_config().address(), "127.0.0.1:0");
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let store = MemoryStore::new();
        let first = HostRuntime::start(&local_config(), engine(&store)).await.unwrap();
        let taken = HostConfig {
            port: first.local_addr().port(),
            ..local_config()
        };
        assert!(matches!(
            HostRuntime::start(&taken, engine(&store)).await,
            Err(RelayError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_and_depart_persists() {
        let store = MemoryStore::new();
        let runtime = HostRuntime::start(&local_config(), engine(&store)).await.unwrap();
        let addr = runtime.local_addr();
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(runtime.run(rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let hello = read_frame(&mut stream).await.unwrap().unwrap();
        let RelayControl::RelayHello { connection_id } =
            serde_json::from_slice::<RelayControl>(&hello).unwrap();

        let joined = WireMessage::PlayerJoined {
            socket_id: Some(connection_id.clone()),
            player_info: PlayerInfo {
                name: "Alice".to_string(),
                x: 120.0,
                y: 80.0,
            },
        };
        write_frame(&mut stream, &joined.to_bytes().unwrap()).await.unwrap();

        match next_message(&mut stream).await {
            WireMessage::FullWorldState { doors, players } => {
                assert_eq!(doors.len(), 2);
                assert!(players.iter().any(|p| p.socket_id == connection_id));
            }
            other => panic!("expected full-world-state, got {:?}", other),
        }

        tx.send(Command::Local(LocalCommand::ToggleDoor(1))).await.unwrap();
        loop {
            if let WireMessage::DoorUpdate { door_id, is_open } = next_message(&mut stream).await {
                assert_eq!((door_id, is_open), (1, true));
                break;
            }
        }

        tx.send(Command::Local(LocalCommand::Depart)).await.unwrap();
        let session = handle.await.unwrap();
        assert!(session.as_host().unwrap().doors().get(1).unwrap().is_open());

        let saved = store.world(0).unwrap();
        assert_eq!(saved.doors, vec![DoorSave { is_open: false }, DoorSave { is_open: true }]);
        assert_eq!(saved.saved_position("Alice"), Some(Position::new(120.0, 80.0)));
    }
}
