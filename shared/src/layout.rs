//! Door and spawn definitions baked into a map

use crate::doors::{Direction, DoorSet, RuntimeDoor};
use crate::world::{DoorSave, Position};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const DEFAULT_OBJECT_SIZE: f32 = 32.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub name: String,
    pub value: Value,
}

/// A door object as declared in the map's door layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorObject {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub rotation: Option<f32>,
    #[serde(default)]
    pub properties: Vec<ObjectProperty>,
}

impl DoorObject {
    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    fn width(&self) -> f32 {
        self.width.filter(|w| *w > 0.0).unwrap_or(DEFAULT_OBJECT_SIZE)
    }

    fn height(&self) -> f32 {
        self.height.filter(|h| *h > 0.0).unwrap_or(DEFAULT_OBJECT_SIZE)
    }

    pub fn center(&self) -> Position {
        Position::new(self.x + self.width() / 2.0, self.y + self.height() / 2.0)
    }

    /// Facing from the `direction` property, then rotation, then aspect ratio
    pub fn direction(&self) -> Direction {
        if let Some(value) = self.property("direction") {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match text.parse() {
                Ok(direction) => return direction,
                Err(e) => warn!("Door at ({}, {}): {}", self.x, self.y, e),
            }
        }

        match self.rotation {
            Some(rotation) if rotation != 0.0 => Direction::from_rotation(rotation),
            _ if self.height() > self.width() => Direction::Up,
            _ => Direction::Right,
        }
    }

    /// Map default for `isOpen`
    pub fn default_open(&self) -> bool {
        match self.property("isOpen") {
            Some(Value::Bool(open)) => *open,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapLayout {
    #[serde(default)]
    pub doors: Vec<DoorObject>,
    #[serde(default)]
    pub spawn: Option<Position>,
}

impl MapLayout {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Builds runtime doors; a saved state at the same index wins over the
    /// map default.
    pub fn build_doors(&self, saved: &[DoorSave]) -> DoorSet {
        let doors = self
            .doors
            .iter()
            .enumerate()
            .map(|(id, object)| {
                let is_open = saved
                    .get(id)
                    .map(|save| save.is_open)
                    .unwrap_or_else(|| object.default_open());
                RuntimeDoor::new(id, object.direction(), object.center(), is_open)
            })
            .collect();
        DoorSet::new(doors)
    }
}

/// Doors for a world, from the layout when there is one
pub fn doors_for(layout: Option<&MapLayout>, saved: &[DoorSave]) -> DoorSet {
    match layout {
        Some(layout) => layout.build_doors(saved),
        None => DoorSet::from_saves(saved),
    }
}

/// Saved position for `name`, else the map spawn, else the default spawn
pub fn spawn_point(layout: Option<&MapLayout>, saved: Option<Position>) -> Position {
    saved
        .or_else(|| layout.and_then(|l| l.spawn))
        .unwrap_or(Position::new(crate::DEFAULT_SPAWN.0, crate::DEFAULT_SPAWN.1))
}
