//! World state model: the persisted record plus the live player roster

use crate::protocol::{ConnectionId, PlayerState};
use crate::SMOOTHING_FACTOR;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// False for infinite or NaN coordinates, which JSON cannot carry
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Moves `alpha` of the way towards `target`
    pub fn lerp(&self, target: &Position, alpha: f32) -> Position {
        Position {
            x: self.x + (target.x - self.x) * alpha,
            y: self.y + (target.y - self.y) * alpha,
        }
    }
}

/// Persisted state of one door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorSave {
    pub is_open: bool,
}

/// Persisted world record.
///
/// `players` holds the last known position of everyone who ever left the
/// world, keyed by display name. `doors` is index-aligned with the doors the
/// map declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(rename = "name")]
    pub world_name: String,
    #[serde(default)]
    pub players: HashMap<String, Position>,
    #[serde(default)]
    pub doors: Vec<DoorSave>,
}

impl WorldState {
    pub fn new(world_name: impl Into<String>) -> Self {
        Self {
            world_name: world_name.into(),
            players: HashMap::new(),
            doors: Vec::new(),
        }
    }

    /// Records where a named player was last seen
    pub fn fold_player(&mut self, name: &str, position: Position) {
        self.players.insert(name.to_string(), position);
    }

    pub fn saved_position(&self, name: &str) -> Option<Position> {
        self.players.get(name).copied()
    }
}

/// A player attached to the live session
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimePlayer {
    pub connection_id: ConnectionId,
    pub name: String,
    /// Last received (or, for the host, authoritative) position
    pub position: Position,
    /// Smoothed position for presentation; never sent or persisted
    pub display_position: Position,
}

impl RuntimePlayer {
    pub fn new(connection_id: ConnectionId, name: impl Into<String>, position: Position) -> Self {
        Self {
            connection_id,
            name: name.into(),
            position,
            display_position: position,
        }
    }

    pub fn from_state(state: &PlayerState) -> Self {
        Self::new(state.socket_id.clone(), state.name.clone(), state.position())
    }

    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            socket_id: self.connection_id.clone(),
            name: self.name.clone(),
            x: self.position.x,
            y: self.position.y,
        }
    }

    /// Name to persist under; unnamed peers fall back to their connection
    pub fn save_name(&self) -> String {
        if self.name.is_empty() {
            format!("socket-{}", self.connection_id)
        } else {
            self.name.clone()
        }
    }

    pub fn smooth(&mut self) {
        self.display_position = self.display_position.lerp(&self.position, SMOOTHING_FACTOR);
    }
}

/// Live players keyed by connection
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: HashMap<ConnectionId, RuntimePlayer>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates a player.
    ///
    /// An empty `name` keeps whatever name was already known. Returns true if
    /// the player was not on the roster before.
    pub fn upsert(&mut self, id: &ConnectionId, name: &str, position: Position) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.position = position;
                if !name.is_empty() {
                    player.name = name.to_string();
                }
                false
            }
            None => {
                self.players
                    .insert(id.clone(), RuntimePlayer::new(id.clone(), name, position));
                true
            }
        }
    }

    pub fn upsert_state(&mut self, state: &PlayerState) -> bool {
        self.upsert(&state.socket_id, &state.name, state.position())
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<RuntimePlayer> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&RuntimePlayer> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.players.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimePlayer> {
        self.players.values()
    }

    /// Wire view of every player, sorted by connection for stable output
    pub fn states(&self) -> Vec<PlayerState> {
        let mut states: Vec<PlayerState> = self.players.values().map(RuntimePlayer::to_state).collect();
        states.sort_by(|a, b| a.socket_id.cmp(&b.socket_id));
        states
    }

    pub fn smooth_all(&mut self) {
        for player in self.players.values_mut() {
            player.smooth();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_world_state_json_shape() {
        let mut world = WorldState::new("Forest");
        world.fold_player("Alice", Position::new(120.0, 80.0));
        world.doors = vec![DoorSave { is_open: true }, DoorSave { is_open: false }];

        let value = serde_json::to_value(&world).unwrap();
        assert_eq!(value["name"], "Forest");
        assert_eq!(value["players"]["Alice"]["x"], 120.0);
        assert_eq!(value["doors"][0]["isOpen"], true);
        assert_eq!(value["doors"][1]["isOpen"], false);
    }

    #[test]
    fn test_world_state_missing_sections_default() {
        let world: WorldState = serde_json::from_str(r#"{"name":"Empty"}"#).unwrap();
        assert_eq!(world.world_name, "Empty");
        assert!(world.players.is_empty());
        assert!(world.doors.is_empty());
    }

    #[test]
    fn test_fold_player_overwrites() {
        let mut world = WorldState::new("w");
        world.fold_player("Bob", Position::new(1.0, 2.0));
        world.fold_player("Bob", Position::new(3.0, 4.0));
        assert_eq!(world.saved_position("Bob"), Some(Position::new(3.0, 4.0)));
        assert_eq!(world.saved_position("Nobody"), None);
    }

    #[test]
    fn test_roster_upsert_reports_new_players() {
        let mut roster = Roster::new();
        let id = ConnectionId::from("a");

        assert!(roster.upsert(&id, "Alice", Position::new(1.0, 1.0)));
        assert!(!roster.upsert(&id, "Alice", Position::new(2.0, 3.0)));

        let player = roster.get(&id).unwrap();
        assert_eq!(player.position, Position::new(2.0, 3.0));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_roster_upsert_keeps_name_when_missing() {
        let mut roster = Roster::new();
        let id = ConnectionId::from("a");
        roster.upsert(&id, "Alice", Position::default());
        roster.upsert(&id, "", Position::new(5.0, 5.0));
        assert_eq!(roster.get(&id).unwrap().name, "Alice");
    }

    #[test]
    fn test_roster_states_sorted() {
        let mut roster = Roster::new();
        roster.upsert(&ConnectionId::from("c"), "C", Position::default());
        roster.upsert(&ConnectionId::from("a"), "A", Position::default());
        roster.upsert(&ConnectionId::from("b"), "B", Position::default());

        let ids: Vec<String> = roster
            .states()
            .into_iter()
            .map(|s| s.socket_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_save_name_fallback() {
        let unnamed = RuntimePlayer::new(ConnectionId::from("xyz"), "", Position::default());
        assert_eq!(unnamed.save_name(), "socket-xyz");

        let named = RuntimePlayer::new(ConnectionId::from("xyz"), "Zoe", Position::default());
        assert_eq!(named.save_name(), "Zoe");
    }

    #[test]
    fn test_smoothing_moves_towards_position() {
        let mut player = RuntimePlayer::new(ConnectionId::from("a"), "A", Position::new(0.0, 0.0));
        player.position = Position::new(100.0, 50.0);

        player.smooth();
        assert_approx_eq!(player.display_position.x, 20.0, 0.001);
        assert_approx_eq!(player.display_position.y, 10.0, 0.001);

        for _ in 0..100 {
            player.smooth();
        }
        assert_approx_eq!(player.display_position.x, 100.0, 0.01);
    }

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_approx_eq!(a.distance_to(&b), 5.0);
    }
}
