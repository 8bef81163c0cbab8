//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every frame
//! is a JSON text message tagged by `"type"`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::PlayerId;
use crate::runtime::handler::MatchId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Log in with a device id. The same device always gets the same user id.
    Authenticate {
        /// Client-chosen device identifier.
        device_id: String,
    },

    /// Enter the matchmaking queue.
    AddMatchmaker,

    /// Leave the matchmaking queue.
    RemoveMatchmaker {
        /// Ticket from `matchmaker_ticket`.
        ticket: Uuid,
    },

    /// Join a match by id.
    JoinMatch {
        /// Match to join.
        match_id: MatchId,
    },

    /// Send an action to a match.
    MatchData {
        /// Target match.
        match_id: MatchId,
        /// Action opcode.
        op_code: i64,
        /// Action payload, usually JSON.
        data: String,
    },

    /// Leave a match.
    LeaveMatch {
        /// Match to leave.
        match_id: MatchId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication succeeded.
    Authenticated {
        /// User id for this device.
        user_id: PlayerId,
        /// Server version string.
        server_version: String,
    },

    /// Queued for matchmaking.
    MatchmakerTicket {
        /// Ticket for cancelling.
        ticket: Uuid,
    },

    /// An opponent was found and a match created.
    MatchmakerMatched {
        /// Match to join.
        match_id: MatchId,
        /// Everyone paired into the match.
        user_ids: Vec<PlayerId>,
    },

    /// Join accepted.
    MatchJoined {
        /// Joined match.
        match_id: MatchId,
        /// Match label.
        label: String,
    },

    /// Broadcast from a match.
    MatchData {
        /// Source match.
        match_id: MatchId,
        /// Broadcast opcode.
        op_code: i64,
        /// Broadcast payload.
        data: String,
    },

    /// Ping response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time in unix milliseconds.
        server_time: i64,
    },

    /// Error response.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Server error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request needs authentication first.
    NotAuthenticated,
    /// Frame did not parse.
    InvalidMessage,
    /// Device id empty or too long.
    InvalidDeviceId,
    /// No such live match.
    MatchNotFound,
    /// Match refused the join.
    MatchJoinRejected,
    /// Already in a match.
    AlreadyInMatch,
    /// Not in that match.
    NotInMatch,
    /// Matchmaking could not create a match.
    MatchmakerFailed,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let id = MatchId(Uuid::from_u128(1));
        let msg = ClientMessage::MatchData {
            match_id: id,
            op_code: 1,
            data: r#"{"position":4}"#.to_string(),
        };

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "match_data");
        assert_eq!(value["match_id"], id.to_string());
        assert_eq!(value["op_code"], 1);

        assert_eq!(ClientMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_parse_client_messages() {
        let auth = ClientMessage::from_json(r#"{"type":"authenticate","device_id":"abc"}"#).unwrap();
        assert_eq!(auth, ClientMessage::Authenticate { device_id: "abc".to_string() });

        let add = ClientMessage::from_json(r#"{"type":"add_matchmaker"}"#).unwrap();
        assert_eq!(add, ClientMessage::AddMatchmaker);

        let ping = ClientMessage::from_json(r#"{"type":"ping","timestamp":42}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping { timestamp: 42 });
    }

    #[test]
    fn test_invalid_client_messages() {
        assert!(ClientMessage::from_json("not json").is_err());
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"join_match","match_id":"nope"}"#).is_err());
    }

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::MatchmakerMatched {
            match_id: MatchId(Uuid::from_u128(9)),
            user_ids: vec![PlayerId(Uuid::from_u128(1)), PlayerId(Uuid::from_u128(2))],
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "matchmaker_matched");
        assert_eq!(value["user_ids"].as_array().unwrap().len(), 2);

        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::MatchJoinRejected, "Match is full");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "code": "match_join_rejected", "message": "Match is full"})
        );
    }
}
