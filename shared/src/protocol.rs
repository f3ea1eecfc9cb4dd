//! Wire messages exchanged between the host and its peers
//!
//! Every application message is a JSON object carrying a `type` tag. The
//! relay never looks inside them; only the engines on either end do. Decoding
//! is deliberately lenient: an unknown `type` is reported as [`Decoded::Unknown`]
//! so newer peers can talk to older ones, and anything without a usable `type`
//! becomes [`Decoded::Malformed`] instead of an error.

use crate::world::{DoorSave, Position};
use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Length of relay-assigned connection identifiers
pub const CONNECTION_ID_LEN: usize = 20;

/// Opaque identifier the relay assigns to each connection.
///
/// Unique per connection and never reused; a reconnecting peer gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CONNECTION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Name and position a client announces when joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub name: String,
    pub x: f32,
    pub y: f32,
}

impl PlayerInfo {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// One player as seen on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub socket_id: ConnectionId,
    #[serde(default)]
    pub name: String,
    pub x: f32,
    pub y: f32,
}

impl PlayerState {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Application-level messages carried inside relay frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    /// Client announces itself to the host
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket_id: Option<ConnectionId>,
        player_info: PlayerInfo,
    },
    /// Authoritative snapshot sent to a joining client only
    FullWorldState {
        doors: Vec<DoorSave>,
        players: Vec<PlayerState>,
    },
    /// Incremental update broadcast by the host
    StateUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        players: Option<Vec<PlayerState>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        doors: Option<Vec<DoorSave>>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { socket_id: ConnectionId },
    /// Client pushes its own position to the host
    PlayerUpdate { name: String, x: f32, y: f32 },
    /// Request (client to host) or confirmation (host to everyone)
    #[serde(rename_all = "camelCase")]
    DoorUpdate { door_id: i64, is_open: bool },
}

const KNOWN_TYPES: [&str; 6] = [
    "player-joined",
    "full-world-state",
    "state-update",
    "player-left",
    "player-update",
    "door-update",
];

impl WireMessage {
    /// The `type` tag this message serializes with
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::PlayerJoined { .. } => "player-joined",
            WireMessage::FullWorldState { .. } => "full-world-state",
            WireMessage::StateUpdate { .. } => "state-update",
            WireMessage::PlayerLeft { .. } => "player-left",
            WireMessage::PlayerUpdate { .. } => "player-update",
            WireMessage::DoorUpdate { .. } => "door-update",
        }
    }

    /// True when every coordinate in the message is a finite number
    pub fn has_finite_coordinates(&self) -> bool {
        match self {
            WireMessage::PlayerJoined { player_info, .. } => player_info.position().is_finite(),
            WireMessage::PlayerUpdate { x, y, .. } => Position::new(*x, *y).is_finite(),
            WireMessage::FullWorldState { players, .. } => {
                players.iter().all(|p| p.position().is_finite())
            }
            WireMessage::StateUpdate { players, .. } => {
                players.iter().flatten().all(|p| p.position().is_finite())
            }
            WireMessage::PlayerLeft { .. } | WireMessage::DoorUpdate { .. } => true,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Events raised by the transport itself rather than received on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer's connection to the host's relay dropped
    PeerDisconnected,
    /// The client's connection to the host dropped
    HostDisconnected,
}

/// Everything an engine can be fed
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Wire(WireMessage),
    Transport(TransportEvent),
}

impl From<WireMessage> for Inbound {
    fn from(message: WireMessage) -> Self {
        Inbound::Wire(message)
    }
}

impl From<TransportEvent> for Inbound {
    fn from(event: TransportEvent) -> Self {
        Inbound::Transport(event)
    }
}

/// Outcome of decoding one relay payload
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(WireMessage),
    /// Well-formed envelope with a `type` this build does not know
    Unknown(String),
    /// Not JSON, not an object, no `type`, or a known type with bad fields
    Malformed(String),
}

/// Decodes a payload without ever failing
pub fn decode(bytes: &[u8]) -> Decoded {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => decode_value(value),
        Err(e) => Decoded::Malformed(format!("invalid JSON: {}", e)),
    }
}

pub fn decode_value(value: Value) -> Decoded {
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Decoded::Malformed("missing type field".to_string()),
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Decoded::Unknown(kind);
    }

    match serde_json::from_value::<WireMessage>(value) {
        Ok(message) if message.has_finite_coordinates() => Decoded::Message(message),
        Ok(_) => Decoded::Malformed(format!("bad {} message: non-finite coordinate", kind)),
        Err(e) => Decoded::Malformed(format!("bad {} message: {}", kind, e)),
    }
}

/// Decodes a payload and logs whatever is dropped.
///
/// `origin` is only used to make the log lines traceable.
pub fn decode_logged(bytes: &[u8], origin: &str) -> Option<WireMessage> {
    match decode(bytes) {
        Decoded::Message(message) => Some(message),
        Decoded::Unknown(kind) => {
            debug!("Ignoring unknown message type '{}' from {}", kind, origin);
            None
        }
        Decoded::Malformed(reason) => {
            warn!("Dropping malformed message from {}: {}", origin, reason);
            None
        }
    }
}

/// Relay-level frames, distinct from application messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayControl {
    /// First frame on every accepted connection
    #[serde(rename_all = "camelCase")]
    RelayHello { connection_id: ConnectionId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_player_joined_wire_shape() {
        let message = WireMessage::PlayerJoined {
            socket_id: Some(ConnectionId::from("abc")),
            player_info: PlayerInfo {
                name: "Alice".to_string(),
                x: 10.0,
                y: 20.0,
            },
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "player-joined",
                "socketId": "abc",
                "playerInfo": { "name": "Alice", "x": 10.0, "y": 20.0 }
            })
        );
    }

    #[test]
    fn test_door_update_wire_shape() {
        let value = serde_json::to_value(WireMessage::DoorUpdate {
            door_id: 3,
            is_open: true,
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "door-update", "doorId": 3, "isOpen": true }));
    }

    #[test]
    fn test_state_update_omits_absent_sections() {
        let value = serde_json::to_value(WireMessage::StateUpdate {
            players: None,
            doors: Some(vec![DoorSave { is_open: false }]),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "state-update", "doors": [{ "isOpen": false }] })
        );
    }

    #[test]
    fn test_decode_state_update_without_doors() {
        let raw = br#"{"type":"state-update","players":[{"socketId":"p1","name":"Bob","x":1,"y":2}]}"#;
        match decode(raw) {
            Decoded::Message(WireMessage::StateUpdate { players, doors }) => {
                let players = players.unwrap();
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].socket_id.as_str(), "p1");
                assert_eq!(players[0].name, "Bob");
                assert!(doors.is_none());
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            decode(br#"{"type":"bogus","x":1}"#),
            Decoded::Unknown("bogus".to_string())
        );
    }

    #[test]
    fn test_decode_missing_type_is_malformed() {
        assert!(matches!(decode(br#"{"doorId":1}"#), Decoded::Malformed(_)));
        assert!(matches!(decode(br#"[1,2,3]"#), Decoded::Malformed(_)));
        assert!(matches!(decode(b"not json"), Decoded::Malformed(_)));
    }

    #[test]
    fn test_decode_known_type_with_bad_fields_is_malformed() {
        assert!(matches!(
            decode(br#"{"type":"door-update","doorId":"one"}"#),
            Decoded::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_overflowing_coordinates_is_malformed() {
        assert!(matches!(
            decode(br#"{"type":"player-update","name":"Mallory","x":1e39,"y":5}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(
            decode(br#"{"type":"player-joined","playerInfo":{"name":"M","x":0,"y":-1e40}}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(
            decode(br#"{"type":"state-update","players":[{"socketId":"p","name":"M","x":1e39,"y":0}]}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(
            decode(br#"{"type":"player-update","name":"Ok","x":3.4e38,"y":5}"#),
            Decoded::Message(_)
        ));
    }

    #[test]
    fn test_decode_negative_door_id_is_accepted() {
        assert_eq!(
            decode(br#"{"type":"door-update","doorId":-1,"isOpen":true}"#),
            Decoded::Message(WireMessage::DoorUpdate {
                door_id: -1,
                is_open: true
            })
        );
    }

    #[test]
    fn test_decode_logged_drops_garbage() {
        assert!(decode_logged(b"{}", "test").is_none());
        assert!(decode_logged(br#"{"type":"host-disconnected"}"#, "test").is_none());
        assert!(decode_logged(br#"{"type":"player-left","socketId":"x"}"#, "test").is_some());
    }

    #[test]
    fn test_generated_connection_ids_are_distinct() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_eq!(a.as_str().len(), CONNECTION_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_relay_hello_shape() {
        let hello = RelayControl::RelayHello {
            connection_id: ConnectionId::from("xyz"),
        };
        let value = serde_json::to_value(&hello).unwrap();
        assert_eq!(value, json!({ "type": "relay-hello", "connectionId": "xyz" }));
        let back: RelayControl = serde_json::from_value(value).unwrap();
        assert_eq!(back, hello);
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let message = WireMessage::PlayerUpdate {
            name: "n".to_string(),
            x: 0.0,
            y: 0.0,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], message.kind());
    }
}
