//! Relay room management.
//!
//! A room has two seats. Whoever waits in the room first is seated as the
//! first mover; the participant completing the pair is the second mover. The
//! relay never looks at moves beyond routing them to the other seat.

use gambit_core::{ParticipantId, Role, RoomName, ServerMessage};
use thiserror::Error;
use uuid::Uuid;

/// Seats per room.
const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,

    #[error("Room is closing, pick another name")]
    RoomClosed,

    #[error("Already in this room")]
    AlreadyInRoom,

    #[error("Not in room")]
    NotInRoom,

    #[error("Opponent has not joined yet")]
    NotPaired,
}

/// Room status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Paired,
    /// A participant left a paired room; it is removed once empty
    Closed,
}

/// A participant seated in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMember {
    /// Relay-side connection the member talks through
    pub connection_id: Uuid,
    pub participant_id: ParticipantId,
    /// Assigned when the room pairs
    pub role: Option<Role>,
}

impl RoomMember {
    pub fn new(connection_id: Uuid, participant_id: ParticipantId) -> Self {
        Self {
            connection_id,
            participant_id,
            role: None,
        }
    }
}

pub struct RelayRoom {
    pub name: RoomName,
    pub status: RoomStatus,
    /// Members in join order
    pub members: Vec<RoomMember>,
}

impl RelayRoom {
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            status: RoomStatus::Waiting,
            members: Vec::with_capacity(ROOM_CAPACITY),
        }
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= ROOM_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, connection_id: Uuid) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.connection_id == connection_id)
    }

    /// The other seat, if taken.
    pub fn peer_of(&self, connection_id: Uuid) -> Option<&RoomMember> {
        self.member(connection_id)?;
        self.members.iter().find(|m| m.connection_id != connection_id)
    }

    /// Seat a participant. Returns true when this join paired the room.
    pub fn add_member(
        &mut self,
        connection_id: Uuid,
        participant_id: ParticipantId,
    ) -> Result<bool, RoomError> {
        if self.status == RoomStatus::Closed {
            return Err(RoomError::RoomClosed);
        }
        if self.member(connection_id).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        self.members.push(RoomMember::new(connection_id, participant_id));
        if !self.is_full() {
            return Ok(false);
        }

        self.members[0].role = Some(Role::FirstMover);
        self.members[1].role = Some(Role::SecondMover);
        self.status = RoomStatus::Paired;
        Ok(true)
    }

    /// Remove a member. A paired room that loses a member is closed.
    pub fn remove_member(&mut self, connection_id: Uuid) -> Result<RoomMember, RoomError> {
        let idx = self
            .members
            .iter()
            .position(|m| m.connection_id == connection_id)
            .ok_or(RoomError::NotInRoom)?;
        let member = self.members.remove(idx);

        if self.status == RoomStatus::Paired {
            self.status = RoomStatus::Closed;
        }
        Ok(member)
    }

    /// Pairing confirmations for every seat, addressed by connection.
    pub fn pairing_messages(&self) -> Vec<(Uuid, ServerMessage)> {
        self.members
            .iter()
            .filter_map(|m| {
                let role = m.role?;
                let message = match role {
                    Role::FirstMover => format!("An opponent joined {}. You play White.", self.name),
                    Role::SecondMover => format!("Joined {}. You play Black.", self.name),
                };
                Some((m.connection_id, ServerMessage::UserJoined { role, message }))
            })
            .collect()
    }
}
