//! # Host and Relay Library
//!
//! This library runs the hosting side of a shared-world session. The host
//! process embeds a small TCP relay that peers connect to; every message a
//! peer sends goes through the relay to the host, and everything the host
//! decides goes back out through the relay.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! The host owns the canonical door states and player roster. Door requests
//! from peers are applied in the order the relay delivers them and confirmed
//! to everyone, the requester included, so all peers converge on the same
//! sequence of states.
//!
//! ### Connection Management
//! The relay assigns each accepted connection a random identifier, greets it
//! with a `relay-hello` frame and tracks it until it closes. A closing
//! connection is reported to the host as a departure, which folds that
//! player's last position into the saved world.
//!
//! ### State Broadcasting
//! Every 100 ms the host sends a full `state-update` to all peers while at
//! least one is attached.
//!
//! ## Module Organization
//!
//! ### Directory Module (`directory`)
//! Connection bookkeeping: capacity, lookup and target resolution.
//!
//! ### Network Module (`network`)
//! The relay itself: listener, per-connection reader and writer tasks, and
//! routing of outbound messages.
//!
//! ### Host Module (`host`)
//! The event loop tying relay events, the broadcast timer and local commands
//! to a [`shared::HostEngine`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::host::{HostConfig, HostRuntime};
//! use shared::{Command, ConnectionId, DoorSet, HostEngine, MemoryStore, Position, WorldState};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = HostEngine::new(
//!         0,
//!         WorldState::new("Meadow"),
//!         DoorSet::default(),
//!         ConnectionId::generate(),
//!         "Host",
//!         Position::new(100.0, 100.0),
//!         Box::new(MemoryStore::new()),
//!     );
//!     let runtime = HostRuntime::start(&HostConfig::default(), engine).await?;
//!
//!     let (_commands, rx) = mpsc::channel::<Command>(16);
//!     runtime.run(rx).await;
//!     Ok(())
//! }
//! ```

pub mod directory;
pub mod host;
pub mod network;
