//! Door interaction logic
//!
//! Only `isOpen` ever crosses the wire. The sprite frame and the collision
//! flag are derived locally from `(direction, is_open)`, and `direction` comes
//! from static map data, so every peer resolves the same door to the same
//! frame without transmitting it.

use crate::world::{DoorSave, Position};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame offset added to the base frame when a door is open
pub const OPEN_FRAME_OFFSET: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub fn base_frame(self) -> u32 {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    /// Maps a map-object rotation in degrees to a facing
    pub fn from_rotation(degrees: f32) -> Self {
        let normalized = ((degrees.round() as i64 % 360) + 360) % 360;
        match normalized {
            90 => Direction::Right,
            180 => Direction::Down,
            270 => Direction::Left,
            _ => Direction::Up,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "right" => Ok(Direction::Right),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            other => Err(format!("unknown door direction '{}'", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
        };
        f.write_str(name)
    }
}

pub fn frame_index(direction: Direction, is_open: bool) -> u32 {
    direction.base_frame() + if is_open { OPEN_FRAME_OFFSET } else { 0 }
}

/// A door as it exists in a running session.
///
/// `is_open`, `frame` and `collidable` only change together through
/// [`RuntimeDoor::set_open`], so the visual never contradicts collision.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeDoor {
    id: usize,
    direction: Direction,
    position: Position,
    is_open: bool,
    frame: u32,
    collidable: bool,
}

impl RuntimeDoor {
    pub fn new(id: usize, direction: Direction, position: Position, is_open: bool) -> Self {
        let mut door = Self {
            id,
            direction,
            position,
            is_open,
            frame: 0,
            collidable: true,
        };
        door.set_open(is_open);
        door
    }

    pub fn set_open(&mut self, is_open: bool) {
        self.is_open = is_open;
        self.frame = frame_index(self.direction, is_open);
        self.collidable = !is_open;
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn collidable(&self) -> bool {
        self.collidable
    }

    pub fn save(&self) -> DoorSave {
        DoorSave {
            is_open: self.is_open,
        }
    }
}

/// Every door of the loaded map, in map-declared order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorSet {
    doors: Vec<RuntimeDoor>,
}

impl DoorSet {
    pub fn new(doors: Vec<RuntimeDoor>) -> Self {
        Self { doors }
    }

    /// Doors facing up at the origin, one per saved state.
    ///
    /// Used when no map layout is available.
    pub fn from_saves(saves: &[DoorSave]) -> Self {
        let doors = saves
            .iter()
            .enumerate()
            .map(|(id, save)| RuntimeDoor::new(id, Direction::Up, Position::default(), save.is_open))
            .collect();
        Self { doors }
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&RuntimeDoor> {
        self.doors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeDoor> {
        self.doors.iter()
    }

    /// Resolves a wire door id, rejecting negatives and out-of-range values
    pub fn index_of(&self, door_id: i64) -> Option<usize> {
        usize::try_from(door_id).ok().filter(|&id| id < self.doors.len())
    }

    /// Sets one door. Returns false if `id` is out of range.
    pub fn apply(&mut self, id: usize, is_open: bool) -> bool {
        match self.doors.get_mut(id) {
            Some(door) => {
                door.set_open(is_open);
                true
            }
            None => false,
        }
    }

    /// Flips one door, returning its new state
    pub fn toggle(&mut self, id: usize) -> Option<bool> {
        let door = self.doors.get_mut(id)?;
        let next = !door.is_open();
        door.set_open(next);
        Some(next)
    }

    /// Overwrites doors by index, ignoring entries past the local door count
    pub fn apply_states(&mut self, states: &[DoorSave]) {
        for (door, state) in self.doors.iter_mut().zip(states) {
            door.set_open(state.is_open);
        }
    }

    /// Replaces the whole array with an authoritative one.
    ///
    /// Local doors keep their direction and position; a length mismatch with
    /// the local map is logged and resolved in favour of the authoritative
    /// array.
    pub fn replace_states(&mut self, states: &[DoorSave]) {
        if states.len() != self.doors.len() {
            warn!(
                "Authoritative door array has {} doors, local map declares {}",
                states.len(),
                self.doors.len()
            );
            self.doors.truncate(states.len());
            for id in self.doors.len()..states.len() {
                self.doors
                    .push(RuntimeDoor::new(id, Direction::Up, Position::default(), false));
            }
        }
        self.apply_states(states);
    }

    pub fn states(&self) -> Vec<DoorSave> {
        self.doors.iter().map(RuntimeDoor::save).collect()
    }

    /// Closest door within `radius` of `from`
    pub fn closest(&self, from: &Position, radius: f32) -> Option<&RuntimeDoor> {
        self.doors
            .iter()
            .map(|door| (door, from.distance_to(&door.position())))
            .filter(|(_, distance)| *distance < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(door, _)| door)
    }
}
