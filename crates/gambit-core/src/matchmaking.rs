//! Join requests and pairing confirmation.

use crate::identity::{Role, RoomName, Session, SessionError};
use crate::protocol::ClientMessage;
use crate::transport::{Outbound, TransportError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchmakingError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("could not send join request: {0}")]
    Transport(#[from] TransportError),
}

/// Sends join requests and turns pairing confirmations into a seat.
#[derive(Debug, Clone)]
pub struct Matchmaker<T> {
    outbound: T,
}

impl<T: Outbound> Matchmaker<T> {
    pub fn new(outbound: T) -> Self {
        Self { outbound }
    }

    /// Ask the relay to put this participant in `room_name`.
    ///
    /// Room existence is not checked here; the relay decides.
    pub fn request_join(
        &self,
        session: &mut Session,
        room_name: &str,
    ) -> Result<RoomName, MatchmakingError> {
        let room = RoomName::new(room_name)?;
        if let Some(existing) = session.room_name() {
            return Err(SessionError::AlreadyJoined(existing.clone()).into());
        }

        self.outbound.send(ClientMessage::JoinRoom {
            room_name: room.clone(),
            participant_id: session.participant_id(),
        })?;
        session.mark_joined(room.clone())?;
        info!("Requested to join room {}", room);
        Ok(room)
    }

    /// Apply a pairing confirmation. Only the first one per session counts;
    /// later ones return `None`.
    pub fn on_paired(&self, session: &mut Session, role: Role, message: &str) -> Option<Role> {
        if !session.mark_paired(role) {
            debug!(
                "Ignoring pairing confirmation ({:?}), joined={} paired={}",
                role,
                session.is_joined(),
                session.is_paired()
            );
            return None;
        }
        info!("Paired as {} ({}): {}", role.color_name(), session.participant_id(), message);
        Some(role)
    }

    /// Tell the relay this participant is done with its room.
    pub fn leave_room(&self) -> Result<(), TransportError> {
        self.outbound.send(ClientMessage::LeaveRoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Participant;
    use crate::transport::RecordingOutbound;

    #[test]
    fn test_request_join_sends_message() {
        let outbound = RecordingOutbound::new();
        let matchmaker = Matchmaker::new(outbound.clone());
        let mut session = Session::new(Participant::new());

        let room = matchmaker.request_join(&mut session, "r1").unwrap();

        assert_eq!(room.as_str(), "r1");
        assert!(session.is_joined());
        assert_eq!(
            outbound.sent(),
            vec![ClientMessage::JoinRoom {
                room_name: room,
                participant_id: session.participant_id(),
            }]
        );
    }

    #[test]
    fn test_empty_room_is_refused() {
        let outbound = RecordingOutbound::new();
        let matchmaker = Matchmaker::new(outbound.clone());
        let mut session = Session::new(Participant::new());

        assert_eq!(
            matchmaker.request_join(&mut session, " "),
            Err(MatchmakingError::Session(SessionError::EmptyRoomName))
        );
        assert!(outbound.sent().is_empty());
        assert!(!session.is_joined());
    }

    #[test]
    fn test_join_twice_is_refused() {
        let outbound = RecordingOutbound::new();
        let matchmaker = Matchmaker::new(outbound.clone());
        let mut session = Session::new(Participant::new());

        matchmaker.request_join(&mut session, "r1").unwrap();
        assert!(matchmaker.request_join(&mut session, "r2").is_err());
        assert_eq!(outbound.sent().len(), 1);
    }

    #[test]
    fn test_failed_send_leaves_session_unjoined() {
        let outbound = RecordingOutbound::new();
        outbound.close();
        let matchmaker = Matchmaker::new(outbound);
        let mut session = Session::new(Participant::new());

        assert!(matches!(
            matchmaker.request_join(&mut session, "r1"),
            Err(MatchmakingError::Transport(_))
        ));
        assert!(!session.is_joined());
    }

    #[test]
    fn test_pairing_is_idempotent() {
        let matchmaker = Matchmaker::new(RecordingOutbound::new());
        let mut session = Session::new(Participant::new());

        // Not joined yet
        assert_eq!(matchmaker.on_paired(&mut session, Role::FirstMover, "hi"), None);

        matchmaker.request_join(&mut session, "r1").unwrap();
        assert_eq!(
            matchmaker.on_paired(&mut session, Role::FirstMover, "hi"),
            Some(Role::FirstMover)
        );
        assert_eq!(matchmaker.on_paired(&mut session, Role::SecondMover, "again"), None);
        assert_eq!(session.role(), Some(Role::FirstMover));
    }
}
