//! Wire messages exchanged between clients and the relay.

use crate::engine::{Promotion, Square};
use crate::identity::{ParticipantId, Role, RoomName};
use serde::{Deserialize, Serialize};

/// A move as it travels between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    #[serde(default)]
    pub promotion: Promotion,
}

/// A locally approved move ready for transmission, or a remote move awaiting
/// re-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveMessage {
    pub mv: Move,
    /// Sender's serialized position after the move. Only ever compared
    /// against the locally computed result, never adopted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_after: Option<String>,
}

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Join (or create) a room
    JoinRoom {
        room_name: RoomName,
        participant_id: ParticipantId,
    },

    /// Forward a move to the other participant
    SendMove {
        room_name: RoomName,
        participant_id: ParticipantId,
        mv: Move,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position_after: Option<String>,
        active_turn_after_move: bool,
    },

    /// Leave the current room
    LeaveRoom,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Room is paired; carries the seat the relay assigned to the recipient
    UserJoined { role: Role, message: String },

    /// A move from the other participant
    ReceiveMove {
        room_name: RoomName,
        participant_id: ParticipantId,
        mv: Move,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position_after: Option<String>,
        your_turn: bool,
    },

    /// The other participant left the room
    PeerLeft { participant_id: ParticipantId },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}
