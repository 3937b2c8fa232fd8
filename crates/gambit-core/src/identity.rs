//! Participant identity and per-session bookkeeping.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Room name must not be empty")]
    EmptyRoomName,

    #[error("Already joined room {0}")]
    AlreadyJoined(RoomName),
}

/// Process-unique participant token (random 128-bit UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ParticipantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The local player. Created once per process and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    id: ParticipantId,
}

impl Participant {
    pub fn new() -> Self {
        Self {
            id: ParticipantId::random(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed seat in a two-player session. The first mover plays White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    FirstMover,
    SecondMover,
}

impl Role {
    pub fn opponent(self) -> Self {
        match self {
            Role::FirstMover => Role::SecondMover,
            Role::SecondMover => Role::FirstMover,
        }
    }

    pub fn color_name(self) -> &'static str {
        match self {
            Role::FirstMover => "White",
            Role::SecondMover => "Black",
        }
    }
}

/// A trimmed, non-empty room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: &str) -> Result<Self, SessionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyRoomName);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomName {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RoomName> for String {
    fn from(name: RoomName) -> Self {
        name.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where this participant stands in the join/pair lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    participant: Participant,
    room_name: Option<RoomName>,
    joined: bool,
    paired: bool,
    role: Option<Role>,
}

impl Session {
    pub fn new(participant: Participant) -> Self {
        Self {
            participant,
            room_name: None,
            joined: false,
            paired: false,
            role: None,
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant.id()
    }

    pub fn room_name(&self) -> Option<&RoomName> {
        self.room_name.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Record a join request. A session joins at most one room.
    pub fn mark_joined(&mut self, room: RoomName) -> Result<(), SessionError> {
        if let Some(existing) = &self.room_name {
            return Err(SessionError::AlreadyJoined(existing.clone()));
        }
        self.room_name = Some(room);
        self.joined = true;
        Ok(())
    }

    /// Record the pairing. Returns false if the session was already paired
    /// or never joined.
    pub fn mark_paired(&mut self, role: Role) -> bool {
        if !self.joined || self.paired {
            return false;
        }
        self.paired = true;
        self.role = Some(role);
        true
    }
}
