//! Offline play: one local player, no relay, changes apply immediately

use crate::doors::DoorSet;
use crate::store::WorldStore;
use crate::world::{Position, WorldState};
use log::{debug, error, info, warn};

pub struct SoloEngine {
    slot: usize,
    world: WorldState,
    doors: DoorSet,
    name: String,
    position: Position,
    store: Box<dyn WorldStore + Send>,
    departed: bool,
}

impl SoloEngine {
    pub fn new(
        slot: usize,
        world: WorldState,
        doors: DoorSet,
        name: &str,
        position: Position,
        store: Box<dyn WorldStore + Send>,
    ) -> Self {
        Self {
            slot,
            world,
            doors,
            name: name.to_string(),
            position,
            store,
            departed: false,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn doors(&self) -> &DoorSet {
        &self.doors
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn move_to(&mut self, position: Position) {
        if !position.is_finite() {
            warn!("Ignoring move to a non-finite position");
            return;
        }
        self.position = position;
    }

    /// Flips a door right away; returns the new state
    pub fn toggle_door(&mut self, id: usize) -> Option<bool> {
        let state = self.doors.toggle(id);
        match state {
            Some(open) => debug!("Door {} is now {}", id, if open { "open" } else { "closed" }),
            None => debug!("No door {}", id),
        }
        state
    }

    pub fn interact(&mut self, radius: f32) -> Option<bool> {
        let id = self.doors.closest(&self.position, radius)?.id();
        self.toggle_door(id)
    }

    pub fn save(&mut self) {
        self.world.fold_player(&self.name, self.position);
        self.world.doors = self.doors.states();
        match self.store.save_world_data(self.slot, &self.world) {
            Ok(()) => info!("World '{}' saved", self.world.world_name),
            Err(e) => error!("Failed to save world '{}': {}", self.world.world_name, e),
        }
    }

    /// Saves once on the way out; later calls do nothing
    pub fn depart(&mut self) -> bool {
        if self.departed {
            return false;
        }
        self.save();
        self.departed = true;
        true
    }
}
