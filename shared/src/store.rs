//! Save slots and the `WorldStore` interface
//!
//! The sync engine only ever talks to a [`WorldStore`]. [`JsonFileStore`]
//! keeps every slot in one JSON document on disk; [`MemoryStore`] keeps them
//! in memory and is shareable, which is what tests and throwaway sessions use.

use crate::world::WorldState;
use crate::SLOT_COUNT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("save data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("slot {0} is out of range")]
    SlotOutOfRange(usize),
    #[error("slot {0} is empty")]
    EmptySlot(usize),
    #[error("no free slot left")]
    NoFreeSlot,
}

fn empty_slots() -> Vec<Option<WorldState>> {
    vec![None; SLOT_COUNT]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slots {
    #[serde(default)]
    pub last_player_name: String,
    #[serde(default = "empty_slots")]
    pub world_slots: Vec<Option<WorldState>>,
}

impl Default for Slots {
    fn default() -> Self {
        Self {
            last_player_name: String::new(),
            world_slots: empty_slots(),
        }
    }
}

impl Slots {
    pub fn world(&self, slot: usize) -> Option<&WorldState> {
        self.world_slots.get(slot).and_then(Option::as_ref)
    }

    pub fn first_empty(&self) -> Option<usize> {
        self.world_slots.iter().position(Option::is_none)
    }

    fn normalize(mut self) -> Self {
        self.world_slots.resize(SLOT_COUNT, None);
        self
    }
}

pub trait WorldStore {
    fn load_slots(&self) -> Result<Slots, StoreError>;
    fn save_world_data(&mut self, slot: usize, data: &WorldState) -> Result<(), StoreError>;
    fn save_slots(&mut self, slots: &Slots) -> Result<(), StoreError>;
}

fn check_slot(slot: usize) -> Result<(), StoreError> {
    if slot < SLOT_COUNT {
        Ok(())
    } else {
        Err(StoreError::SlotOutOfRange(slot))
    }
}

/// All slots in a single JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl WorldStore for JsonFileStore {
    fn load_slots(&self) -> Result<Slots, StoreError> {
        if !self.path.exists() {
            return Ok(Slots::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let slots: Slots = serde_json::from_str(&raw)?;
        Ok(slots.normalize())
    }

    fn save_world_data(&mut self, slot: usize, data: &WorldState) -> Result<(), StoreError> {
        check_slot(slot)?;
        let mut slots = self.load_slots()?;
        slots.world_slots[slot] = Some(data.clone());
        self.save_slots(&slots)
    }

    fn save_slots(&mut self, slots: &Slots) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(slots)?;
        // The old file stays intact until the new one is complete
        let temp = self.temp_path();
        std::fs::write(&temp, raw)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// In-memory slots; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<Slots>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_world(slot: usize, world: WorldState) -> Self {
        let store = Self::new();
        if let Some(entry) = store.lock().world_slots.get_mut(slot) {
            *entry = Some(world);
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of a slot's world, for inspection
    pub fn world(&self, slot: usize) -> Option<WorldState> {
        self.lock().world(slot).cloned()
    }
}

impl WorldStore for MemoryStore {
    fn load_slots(&self) -> Result<Slots, StoreError> {
        Ok(self.lock().clone())
    }

    fn save_world_data(&mut self, slot: usize, data: &WorldState) -> Result<(), StoreError> {
        check_slot(slot)?;
        self.lock().world_slots[slot] = Some(data.clone());
        Ok(())
    }

    fn save_slots(&mut self, slots: &Slots) -> Result<(), StoreError> {
        *self.lock() = slots.clone().normalize();
        Ok(())
    }
}

/// A store whose writes always fail
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

#[cfg(test)]
impl WorldStore for FailingStore {
    fn load_slots(&self) -> Result<Slots, StoreError> {
        Ok(Slots::default())
    }

    fn save_world_data(&mut self, _slot: usize, _data: &WorldState) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn save_slots(&mut self, _slots: &Slots) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }
}

/// Loads the world in `slot`
pub fn load_world(store: &dyn WorldStore, slot: usize) -> Result<WorldState, StoreError> {
    check_slot(slot)?;
    store
        .load_slots()?
        .world(slot)
        .cloned()
        .ok_or(StoreError::EmptySlot(slot))
}

/// Creates a fresh, empty world in `slot`, replacing whatever was there
pub fn create_world(
    store: &mut dyn WorldStore,
    slot: usize,
    name: &str,
) -> Result<WorldState, StoreError> {
    check_slot(slot)?;
    let world = WorldState::new(name);
    store.save_world_data(slot, &world)?;
    Ok(world)
}

pub fn delete_world(store: &mut dyn WorldStore, slot: usize) -> Result<(), StoreError> {
    check_slot(slot)?;
    let mut slots = store.load_slots()?;
    slots.world_slots[slot] = None;
    store.save_slots(&slots)
}

pub fn remember_player_name(store: &mut dyn WorldStore, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Ok(());
    }
    let mut slots = store.load_slots()?;
    slots.last_player_name = name.to_string();
    store.save_slots(&slots)
}

/// Writes one slot's world to a standalone JSON file
pub fn export_world(store: &dyn WorldStore, slot: usize, path: &Path) -> Result<(), StoreError> {
    let world = load_world(store, slot)?;
    std::fs::write(path, serde_json::to_string_pretty(&world)?)?;
    Ok(())
}

/// Reads a world file into the first empty slot, returning that slot
pub fn import_world(store: &mut dyn WorldStore, path: &Path) -> Result<usize, StoreError> {
    let mut slots = store.load_slots()?;
    let slot = slots.first_empty().ok_or(StoreError::NoFreeSlot)?;
    let world: WorldState = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    slots.world_slots[slot] = Some(world);
    store.save_slots(&slots)?;
    Ok(slot)
}
