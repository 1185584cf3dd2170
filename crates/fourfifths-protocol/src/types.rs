//! Core protocol types for the fourfifths wire format.
//!
//! Every type in this module travels "on the wire": it is serialized by a
//! [`Codec`](crate::Codec), sent over a connection, and deserialized by the
//! other side. Frames are shaped like socket-style events:
//!
//! ```text
//! { "event": "submit_number", "data": { "roomId": "R1", "number": 42 } }
//! ```
//!
//! Field names inside `data` are camelCase because browsers are the main
//! clients; Rust code keeps its usual snake_case names and serde renames them.

use serde::{Deserialize, Serialize};

use std::fmt;

use fourfifths_transport::ConnectionId;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a player inside a room.
///
/// Humans are identified by their connection (`conn-<n>`), bots by a
/// synthetic id minted when they are added (`bot-<room>-<batch>-<i>`).
/// Both are opaque strings on the wire, so this is a newtype over `String`
/// rather than the transport's numeric id.
///
/// `#[serde(transparent)]` serializes it as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Creates a player id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A connected human is known by the connection that carries them.
impl From<ConnectionId> for PlayerId {
    fn from(id: ConnectionId) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a room, chosen by the client that first references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive an event?
// ---------------------------------------------------------------------------

/// Where an outbound event should be delivered.
///
/// The room core produces `(Recipient, ServerEvent)` pairs and the registry
/// resolves them against its connection table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connection currently subscribed to the room.
    Room(RoomId),

    /// A single connection (e.g. the joiner rejected from a full room).
    Player(PlayerId),
}

// ---------------------------------------------------------------------------
// Roster entries
// ---------------------------------------------------------------------------

/// One entry of a room's roster, exactly as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,

    /// Join rank inside the room (1-based). Never reassigned.
    pub player_number: u8,

    pub is_bot: bool,

    /// Starts at 0 and drops by one for every lost round.
    pub score: i32,

    pub is_ready: bool,
}

impl Player {
    /// A freshly joined human: not ready, no points lost yet.
    pub fn human(id: PlayerId, player_number: u8) -> Self {
        Self {
            id,
            player_number,
            is_bot: false,
            score: 0,
            is_ready: false,
        }
    }

    /// A synthetic player. Bots are always ready.
    pub fn bot(id: PlayerId, player_number: u8) -> Self {
        Self {
            id,
            player_number,
            is_bot: true,
            score: 0,
            is_ready: true,
        }
    }
}

/// One player's guess as reported in `round_results`.
///
/// `score` is the player's score *before* the round was scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedNumber {
    pub id: PlayerId,
    pub player_number: u8,
    pub is_bot: bool,
    pub submitted_number: i64,
    pub score: i32,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a client can send.
///
/// Disconnects are not an event: the transport detects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join (and lazily create) a room. The payload is the bare room id.
    JoinRoom(RoomId),

    /// Mark the sender ready in the given room.
    #[serde(rename_all = "camelCase")]
    PlayerReady { room_id: RoomId },

    /// Submit (or replace) the sender's number for the current round.
    #[serde(rename_all = "camelCase")]
    SubmitNumber { room_id: RoomId, number: i64 },
}

impl ClientEvent {
    /// The room this event targets.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::JoinRoom(room_id)
            | Self::PlayerReady { room_id }
            | Self::SubmitNumber { room_id, .. } => room_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the server sends.
///
/// `Deserialize` is derived too so tests and Rust clients can read frames
/// back without a second set of types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The room's full roster after any membership or readiness change.
    RoomUpdate { players: Vec<Player> },

    /// Sent only to a joiner that found the room full.
    RoomFull(String),

    /// Countdown value; `stopped` is present (and true) only when a running
    /// countdown was aborted.
    ReadyCountdown {
        value: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stopped: Option<bool>,
    },

    #[serde(rename_all = "camelCase")]
    GameStart { current_round: u32 },

    #[serde(rename_all = "camelCase")]
    RoundStart { current_round: u32 },

    /// Outcome of one round. Winner, average, target and winning number
    /// are `null` when the round closed without submissions.
    #[serde(rename_all = "camelCase")]
    RoundResults {
        winner_id: Option<PlayerId>,
        average: Option<f64>,
        target: Option<f64>,
        winning_number: Option<i64>,
        updated_players: Vec<Player>,
        current_round: u32,
        submitted_numbers: Vec<SubmittedNumber>,
    },

    #[serde(rename_all = "camelCase")]
    PlayerEliminated { player_id: PlayerId },

    /// The game ended with at most one player left after a round.
    GameOver {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<Player>,
    },

    /// Elimination left exactly one player standing.
    GameClear { winner: Player },
}

impl ServerEvent {
    /// The wire name of this event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomUpdate { .. } => "room_update",
            Self::RoomFull(_) => "room_full",
            Self::ReadyCountdown { .. } => "ready_countdown",
            Self::GameStart { .. } => "game_start",
            Self::RoundStart { .. } => "round_start",
            Self::RoundResults { .. } => "round_results",
            Self::PlayerEliminated { .. } => "player_eliminated",
            Self::GameOver { .. } => "game_over",
            Self::GameClear { .. } => "game_clear",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player(id: &str, number: u8) -> Player {
        Player::human(PlayerId::new(id), number)
    }

    // -- Identity -----------------------------------------------------------

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::new("conn-4")).unwrap();
        assert_eq!(json, "\"conn-4\"");
    }

    #[test]
    fn test_player_id_from_connection_id() {
        let pid = PlayerId::from(ConnectionId::new(7));
        assert_eq!(pid.as_str(), "conn-7");
        assert_eq!(pid.to_string(), "conn-7");
    }

    #[test]
    fn test_room_id_display_is_raw_id() {
        assert_eq!(RoomId::new("lobby").to_string(), "lobby");
    }

    // -- Client events ------------------------------------------------------

    #[test]
    fn test_join_room_payload_is_bare_room_id() {
        let event: ClientEvent =
            serde_json::from_value(json!({"event": "join_room", "data": "R1"})).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom(RoomId::new("R1")));
    }

    #[test]
    fn test_player_ready_uses_camel_case_room_id() {
        let event: ClientEvent = serde_json::from_value(
            json!({"event": "player_ready", "data": {"roomId": "R1"}}),
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::PlayerReady {
                room_id: RoomId::new("R1")
            }
        );
    }

    #[test]
    fn test_submit_number_decodes() {
        let event: ClientEvent = serde_json::from_value(
            json!({"event": "submit_number", "data": {"roomId": "R1", "number": 33}}),
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SubmitNumber {
                room_id: RoomId::new("R1"),
                number: 33
            }
        );
        assert_eq!(event.room_id(), &RoomId::new("R1"));
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"event": "cheat", "data": {}}));
        assert!(result.is_err());
    }

    // -- Server events ------------------------------------------------------

    #[test]
    fn test_room_update_player_fields_are_camel_case() {
        let event = ServerEvent::RoomUpdate {
            players: vec![player("conn-1", 1)],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "room_update");
        let p = &value["data"]["players"][0];
        assert_eq!(p["id"], "conn-1");
        assert_eq!(p["playerNumber"], 1);
        assert_eq!(p["isBot"], false);
        assert_eq!(p["score"], 0);
        assert_eq!(p["isReady"], false);
    }

    #[test]
    fn test_room_full_payload_is_a_string() {
        let value = serde_json::to_value(ServerEvent::RoomFull("full".into())).unwrap();
        assert_eq!(value, json!({"event": "room_full", "data": "full"}));
    }

    #[test]
    fn test_ready_countdown_omits_stopped_unless_set() {
        let running = serde_json::to_value(ServerEvent::ReadyCountdown {
            value: 3,
            stopped: None,
        })
        .unwrap();
        assert_eq!(running, json!({"event": "ready_countdown", "data": {"value": 3}}));

        let stopped = serde_json::to_value(ServerEvent::ReadyCountdown {
            value: 0,
            stopped: Some(true),
        })
        .unwrap();
        assert_eq!(stopped["data"]["stopped"], true);
    }

    #[test]
    fn test_round_results_wire_shape() {
        let event = ServerEvent::RoundResults {
            winner_id: Some(PlayerId::new("bot-1")),
            average: Some(50.0),
            target: Some(40.0),
            winning_number: Some(40),
            updated_players: vec![],
            current_round: 2,
            submitted_numbers: vec![SubmittedNumber {
                id: PlayerId::new("bot-1"),
                player_number: 3,
                is_bot: true,
                submitted_number: 40,
                score: -1,
            }],
        };
        let value = serde_json::to_value(&event).unwrap();
        let data = &value["data"];
        assert_eq!(data["winnerId"], "bot-1");
        assert_eq!(data["target"], 40.0);
        assert_eq!(data["winningNumber"], 40);
        assert_eq!(data["currentRound"], 2);
        assert_eq!(data["submittedNumbers"][0]["submittedNumber"], 40);
        assert_eq!(data["submittedNumbers"][0]["playerNumber"], 3);
    }

    #[test]
    fn test_round_results_without_submissions_has_nulls() {
        let event = ServerEvent::RoundResults {
            winner_id: None,
            average: None,
            target: None,
            winning_number: None,
            updated_players: vec![],
            current_round: 1,
            submitted_numbers: vec![],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["data"]["winnerId"].is_null());
        assert!(value["data"]["average"].is_null());
        assert!(value["data"]["winningNumber"].is_null());
    }

    #[test]
    fn test_game_over_without_winner_has_empty_payload() {
        let value = serde_json::to_value(ServerEvent::GameOver { winner: None }).unwrap();
        assert_eq!(value, json!({"event": "game_over", "data": {}}));
    }

    #[test]
    fn test_player_eliminated_field_name() {
        let value = serde_json::to_value(ServerEvent::PlayerEliminated {
            player_id: PlayerId::new("conn-2"),
        })
        .unwrap();
        assert_eq!(value["data"]["playerId"], "conn-2");
    }

    #[test]
    fn test_server_event_name_matches_wire_tag() {
        let events = [
            ServerEvent::GameStart { current_round: 1 },
            ServerEvent::RoundStart { current_round: 1 },
            ServerEvent::GameClear {
                winner: player("conn-1", 1),
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.name());
        }
    }

    #[test]
    fn test_recipient_round_trip() {
        let r = Recipient::Room(RoomId::new("R9"));
        let bytes = serde_json::to_vec(&r).unwrap();
        let decoded: Recipient = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(r, decoded);
    }
}
