//! Shared world-synchronization core
//!
//! Everything that both the hosting and the joining side need: wire messages,
//! frame codec, the world and door model, save slots and the three session
//! engines (host, client replica, solo). None of the engines perform network
//! I/O; the `server` and `client` crates drive them.

use std::time::Duration;

pub mod doors;
pub mod framing;
pub mod host;
pub mod layout;
pub mod protocol;
pub mod replica;
pub mod session;
pub mod solo;
pub mod store;
pub mod world;

pub const DEFAULT_PORT: u16 = 3000;
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);
/// How close a player must be to a door to operate it
pub const INTERACT_RADIUS: f32 = 64.0;
pub const SLOT_COUNT: usize = 5;
pub const DEFAULT_SPAWN: (f32, f32) = (100.0, 100.0);
/// Fraction of the remaining distance covered per rendered frame
pub const SMOOTHING_FACTOR: f32 = 0.2;
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub use doors::{Direction, DoorSet, RuntimeDoor};
pub use host::{HostEngine, HostPhase, Outbound, Target};
pub use protocol::{ConnectionId, Decoded, Inbound, TransportEvent, WireMessage};
pub use replica::{ClientPhase, ReplicaEngine};
pub use session::{Command, Effect, LocalCommand, Role, Session};
pub use solo::SoloEngine;
pub use store::{JsonFileStore, MemoryStore, StoreError, WorldStore};
pub use world::{DoorSave, Position, WorldState};
