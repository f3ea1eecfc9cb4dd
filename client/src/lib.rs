//! # Player Client Library
//!
//! The player-facing side of a shared-world session. A player can play a
//! save slot alone, host it for others (running the relay from the `server`
//! crate in-process), or join someone else's host.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The connection to a host's relay:
//! - Dialing with a timeout and reading the `relay-hello` greeting
//! - Reader and writer tasks over length-delimited JSON frames
//! - Exactly one `Closed` event when the host goes away
//!
//! ### Game Module (`game`)
//! Runtimes for the joining and solo roles. Joining applies host messages to
//! a local replica, pushes the player's position every 100 ms and smooths
//! other players toward their reported positions.
//!
//! ### Console Module (`console`)
//! Text commands from stdin: `move X Y`, `interact`, `door N`, `save`,
//! `who` and `quit`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientRuntime;
//! use shared::{Command, DoorSet, Position, ReplicaEngine};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ReplicaEngine::new("Bob", Position::new(100.0, 100.0), DoorSet::default());
//!     let runtime = ClientRuntime::join("127.0.0.1:3000", engine).await?;
//!
//!     let (_commands, rx) = mpsc::channel::<Command>(16);
//!     let (_session, exit) = runtime.run(rx).await;
//!     println!("session ended: {:?}", exit);
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod game;
pub mod network;
