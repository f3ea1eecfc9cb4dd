use clap::{Args, Parser, Subcommand};
use client::console::{spawn_console, HELP};
use client::game::{run_solo, ClientRuntime, Exit};
use log::{info, warn};
use server::host::{HostConfig, HostRuntime, DEFAULT_MAX_PEERS};
use shared::layout::{doors_for, spawn_point, MapLayout};
use shared::store::{
    create_world, delete_world, export_world, import_world, load_world, remember_player_name,
    StoreError,
};
use shared::{
    ConnectionId, HostEngine, JsonFileStore, ReplicaEngine, SoloEngine, WorldState, WorldStore,
    DEFAULT_PORT,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Save file holding all world slots
    #[arg(long, global = true, default_value = "worlds.json")]
    store: PathBuf,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Play a world offline
    Solo(WorldArgs),
    /// Play a world and let others join
    Host {
        #[command(flatten)]
        world: WorldArgs,

        /// Address to bind the relay to
        #[arg(short = 'b', long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Maximum number of peers
        #[arg(long, default_value_t = DEFAULT_MAX_PEERS)]
        max_peers: usize,
    },
    /// Join a hosted world
    Join {
        /// Host address to connect to
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        address: String,

        /// Player name; defaults to the last one used
        #[arg(short, long)]
        name: Option<String>,

        /// Map layout describing the doors
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },
    /// Manage save slots
    #[command(subcommand)]
    Worlds(WorldsCommand),
}

#[derive(Args, Debug)]
struct WorldArgs {
    /// Save slot to play
    #[arg(short, long, default_value = "0")]
    slot: usize,

    /// Player name; defaults to the last one used
    #[arg(short, long)]
    name: Option<String>,

    /// Map layout describing the doors
    #[arg(short, long)]
    layout: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum WorldsCommand {
    /// List all slots
    List,
    /// Create an empty world, replacing the slot's contents
    Create {
        #[arg(short, long)]
        slot: usize,
        #[arg(short, long)]
        name: String,
    },
    /// Empty a slot
    Delete {
        #[arg(short, long)]
        slot: usize,
    },
    /// Write a slot's world to a file
    Export {
        #[arg(short, long)]
        slot: usize,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Read a world file into the first empty slot
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Picks the player name and remembers it for next time
fn player_name(
    store: &mut JsonFileStore,
    name: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    let name = match name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            let last = store.load_slots()?.last_player_name;
            if last.is_empty() {
                "Player".to_string()
            } else {
                last
            }
        }
    };
    remember_player_name(store, &name)?;
    Ok(name)
}

fn load_layout(path: Option<&Path>) -> Result<Option<MapLayout>, Box<dyn std::error::Error>> {
    path.map(MapLayout::load).transpose()
}

struct Prepared {
    world: WorldState,
    layout: Option<MapLayout>,
    name: String,
}

fn prepare(
    store: &mut JsonFileStore,
    args: WorldArgs,
) -> Result<Prepared, Box<dyn std::error::Error>> {
    let name = player_name(store, args.name)?;
    let world = match load_world(&*store, args.slot) {
        Ok(world) => world,
        Err(StoreError::EmptySlot(slot)) => {
            info!("Slot {} is empty, creating a new world", slot);
            create_world(store, slot, &format!("World {}", slot + 1))?
        }
        Err(e) => return Err(e.into()),
    };
    let layout = load_layout(args.layout.as_deref())?;
    Ok(Prepared {
        world,
        layout,
        name,
    })
}

fn worlds(
    store: &mut JsonFileStore,
    command: WorldsCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        WorldsCommand::List => {
            let slots = store.load_slots()?;
            for (slot, world) in slots.world_slots.iter().enumerate() {
                match world {
                    Some(world) => println!(
                        "{}: {} ({} players, {} doors)",
                        slot,
                        world.world_name,
                        world.players.len(),
                        world.doors.len()
                    ),
                    None => println!("{}: <empty>", slot),
                }
            }
        }
        WorldsCommand::Create { slot, name } => {
            create_world(store, slot, &name)?;
            println!("Created '{}' in slot {}", name, slot);
        }
        WorldsCommand::Delete { slot } => {
            delete_world(store, slot)?;
            println!("Slot {} is now empty", slot);
        }
        WorldsCommand::Export { slot, file } => {
            export_world(&*store, slot, &file)?;
            println!("Exported slot {} to {}", slot, file.display());
        }
        WorldsCommand::Import { file } => {
            let slot = import_world(store, &file)?;
            println!("Imported {} into slot {}", file.display(), slot);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let cli = Cli::parse();
    let mut store = JsonFileStore::new(&cli.store);

    match cli.mode {
        Mode::Worlds(command) => return worlds(&mut store, command),

        Mode::Solo(args) => {
            let slot = args.slot;
            let Prepared { world, layout, name } = prepare(&mut store, args)?;
            let doors = doors_for(layout.as_ref(), &world.doors);
            let spawn = spawn_point(layout.as_ref(), world.saved_position(&name));
            let engine = SoloEngine::new(slot, world, doors, &name, spawn, Box::new(store));

            let (commands, rx) = mpsc::channel(16);
            spawn_console(commands);
            println!("{}", HELP);
            run_solo(engine, rx).await;
        }

        Mode::Host {
            world: args,
            bind,
            port,
            max_peers,
        } => {
            let slot = args.slot;
            let Prepared { world, layout, name } = prepare(&mut store, args)?;
            let doors = doors_for(layout.as_ref(), &world.doors);
            let spawn = spawn_point(layout.as_ref(), world.saved_position(&name));
            let engine = HostEngine::new(
                slot,
                world,
                doors,
                ConnectionId::generate(),
                &name,
                spawn,
                Box::new(store),
            );

            let config = HostConfig {
                bind,
                port,
                max_peers,
            };
            let runtime = HostRuntime::start(&config, engine).await?;
            info!("Others can join at {}", runtime.local_addr());

            let (commands, rx) = mpsc::channel(16);
            spawn_console(commands);
            println!("{}", HELP);
            runtime.run(rx).await;
        }

        Mode::Join {
            address,
            name,
            layout,
        } => {
            let name = player_name(&mut store, name)?;
            let layout = load_layout(layout.as_deref())?;
            let doors = doors_for(layout.as_ref(), &[]);
            let spawn = spawn_point(layout.as_ref(), None);
            let engine = ReplicaEngine::new(&name, spawn, doors);

            let runtime = ClientRuntime::join(&address, engine).await?;
            let (commands, rx) = mpsc::channel(16);
            spawn_console(commands);
            println!("{}", HELP);

            let (_, exit) = runtime.run(rx).await;
            if exit == Exit::HostLost {
                warn!("The host left; session over");
            }
        }
    }

    Ok(())
}
