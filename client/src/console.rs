//! Line-based console input
//!
//! Reads commands from stdin and turns them into session [`Command`]s:
//!
//! ```text
//! move X Y     walk to (X, Y)
//! interact     operate the closest door
//! door N       toggle door N
//! save         save the world (host and solo)
//! who          list players and doors
//! quit         leave the session
//! ```

use log::{debug, warn};
use shared::{Command, LocalCommand};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const HELP: &str = "commands: move X Y | interact | door N | save | who | quit";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parses one console line. Blank lines parse to `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("move" | "m", [x, y]) => {
            let (Ok(x), Ok(y)) = (x.parse::<f32>(), y.parse::<f32>()) else {
                return Err(ConsoleError::Usage("move X Y"));
            };
            if !x.is_finite() || !y.is_finite() {
                return Err(ConsoleError::Usage("move X Y"));
            }
            LocalCommand::Move { x, y }.into()
        }
        ("move" | "m", _) => return Err(ConsoleError::Usage("move X Y")),
        ("interact" | "e", []) => LocalCommand::Interact.into(),
        ("door" | "d", [id]) => match id.parse::<usize>() {
            Ok(id) => LocalCommand::ToggleDoor(id).into(),
            Err(_) => return Err(ConsoleError::Usage("door N")),
        },
        ("door" | "d", _) => return Err(ConsoleError::Usage("door N")),
        ("save", []) => LocalCommand::Save.into(),
        ("who", []) => Command::Who,
        ("quit" | "exit" | "q", []) => LocalCommand::Depart.into(),
        (other, _) => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Spawns a task feeding stdin commands into `commands`.
///
/// End of input counts as `quit`.
pub fn spawn_console(commands: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            };
            match parse_line(&line) {
                Ok(Some(command)) => {
                    let done = command == Command::Local(LocalCommand::Depart);
                    if commands.send(command).await.is_err() || done {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    eprintln!("{}", e);
                    eprintln!("{}", HELP);
                }
            }
        }
        debug!("Console input closed");
        let _ = commands.send(LocalCommand::Depart.into()).await;
    })
}
