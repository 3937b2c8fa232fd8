//! Move relay client: outbound move encoding and inbound filtering.

use crate::identity::{ParticipantId, RoomName};
use crate::protocol::{ClientMessage, MoveMessage, ServerMessage};
use crate::transport::{Outbound, TransportError};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MoveRelay<T> {
    outbound: T,
}

impl<T: Outbound> MoveRelay<T> {
    pub fn new(outbound: T) -> Self {
        Self { outbound }
    }

    /// Send an approved local move. No acknowledgement is expected.
    pub fn send_move(
        &self,
        message: &MoveMessage,
        room_name: &RoomName,
        participant_id: ParticipantId,
    ) -> Result<(), TransportError> {
        self.outbound.send(ClientMessage::SendMove {
            room_name: room_name.clone(),
            participant_id,
            mv: message.mv,
            position_after: message.position_after.clone(),
            active_turn_after_move: false,
        })
    }

    /// Extract the move from an inbound message addressed to this session.
    ///
    /// Messages for other rooms and echoes of our own moves are dropped.
    pub fn on_move_received(
        &self,
        message: &ServerMessage,
        local_room: &RoomName,
        local_id: ParticipantId,
    ) -> Option<MoveMessage> {
        let ServerMessage::ReceiveMove {
            room_name,
            participant_id,
            mv,
            position_after,
            your_turn,
        } = message
        else {
            return None;
        };

        if room_name != local_room {
            debug!("Dropping move for room {} (local room {})", room_name, local_room);
            return None;
        }
        if *participant_id == local_id {
            debug!("Dropping echo of our own move {}{}", mv.from, mv.to);
            return None;
        }
        if !your_turn {
            warn!("Relay marked incoming move {}{} as not our turn", mv.from, mv.to);
        }

        Some(MoveMessage {
            mv: *mv,
            position_after: position_after.clone(),
        })
    }
}
