use clap::Parser;
use log::{error, info};
use server::host::{HostConfig, HostRuntime, DEFAULT_MAX_PEERS};
use shared::layout::{doors_for, spawn_point, MapLayout};
use shared::store::{create_world, load_world, StoreError};
use shared::{Command, ConnectionId, HostEngine, JsonFileStore, LocalCommand, DEFAULT_PORT};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Dedicated host: serves one save slot without a local player at the keyboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the relay to
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Save slot to host
    #[arg(short, long, default_value = "0")]
    slot: usize,

    /// Save file holding all slots
    #[arg(long, default_value = "worlds.json")]
    store: PathBuf,

    /// Map layout describing the doors
    #[arg(short, long)]
    layout: Option<PathBuf>,

    /// Name of the host player
    #[arg(short, long, default_value = "Host")]
    name: String,

    /// Maximum number of peers
    #[arg(long, default_value_t = DEFAULT_MAX_PEERS)]
    max_peers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut store = JsonFileStore::new(&args.store);
    let world = match load_world(&store, args.slot) {
        Ok(world) => world,
        Err(StoreError::EmptySlot(slot)) => {
            info!("Slot {} is empty, creating a new world", slot);
            create_world(&mut store, slot, &format!("World {}", slot + 1))?
        }
        Err(e) => return Err(e.into()),
    };

    let layout = args.layout.as_deref().map(MapLayout::load).transpose()?;
    let doors = doors_for(layout.as_ref(), &world.doors);
    let spawn = spawn_point(layout.as_ref(), world.saved_position(&args.name));

    let engine = HostEngine::new(
        args.slot,
        world,
        doors,
        ConnectionId::generate(),
        &args.name,
        spawn,
        Box::new(store),
    );

    let config = HostConfig {
        bind: args.bind,
        port: args.port,
        max_peers: args.max_peers,
    };
    let runtime = HostRuntime::start(&config, engine).await?;
    info!("Peers can join at {}", runtime.local_addr());

    let (commands, rx) = mpsc::channel::<Command>(8);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C, shutting down gracefully...");
        let _ = commands.send(Command::Local(LocalCommand::Depart)).await;
    });

    runtime.run(rx).await;
    Ok(())
}
