//! One participant's game session.
//!
//! Ties together the identity, matchmaking, move relay and turn-sync pieces
//! around a single outbound handle. Whoever owns the inbound subscription
//! feeds relay messages into [`GameSession::handle`]; the renderer calls
//! [`GameSession::attempt_move`] and [`GameSession::view`].

use crate::engine::{ChessEngine, Outcome, RuleEngine};
use crate::identity::{Participant, Role, RoomName, Session};
use crate::matchmaking::{Matchmaker, MatchmakingError};
use crate::presentation::{BoardView, MoveRequest, MoveVerdict, ViewStatus};
use crate::protocol::ServerMessage;
use crate::relay::MoveRelay;
use crate::sync::{Phase, Rejected, TurnSync};
use crate::transport::Outbound;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// What an inbound message did to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Nothing changed
    Ignored,
    /// Seated by the relay; `message` is its display text
    Paired { role: Role, message: String },
    /// The opponent moved and it is now our turn
    OpponentMoved(BoardView),
    Finished(Outcome),
    /// A remote move failed re-validation; the session must be discarded
    Broken,
    /// The opponent left the room
    Abandoned,
    RelayError(String),
}

pub struct GameSession<T, E: RuleEngine = ChessEngine> {
    session: Session,
    matchmaker: Matchmaker<T>,
    relay: MoveRelay<T>,
    sync: TurnSync<E>,
    abandoned: bool,
    left_room: bool,
}

impl<T: Outbound + Clone> GameSession<T, ChessEngine> {
    pub fn new(participant: Participant, outbound: T) -> Self {
        Self::with_engine(participant, outbound, ChessEngine::new())
    }
}

impl<T: Outbound + Clone, E: RuleEngine> GameSession<T, E> {
    pub fn with_engine(participant: Participant, outbound: T, engine: E) -> Self {
        Self {
            session: Session::new(participant),
            matchmaker: Matchmaker::new(outbound.clone()),
            relay: MoveRelay::new(outbound),
            sync: TurnSync::new(engine),
            abandoned: false,
            left_room: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sync(&self) -> &TurnSync<E> {
        &self.sync
    }

    /// The renderer's view, including session-level endings the state
    /// machine does not know about.
    pub fn view(&self) -> BoardView {
        let mut view = BoardView::of(&self.sync);
        if self.abandoned
            && matches!(view.status, ViewStatus::Playing | ViewStatus::WaitingForOpponent)
        {
            view.status = ViewStatus::Abandoned;
        }
        if self.is_over() {
            view.my_turn = false;
        }
        view
    }

    /// True once no further moves can be played in this session.
    pub fn is_over(&self) -> bool {
        self.abandoned
            || self.sync.state().is_terminal()
            || self.sync.phase() == Phase::Desynced
    }

    pub fn join(&mut self, room_name: &str) -> Result<RoomName, MatchmakingError> {
        self.matchmaker.request_join(&mut self.session, room_name)
    }

    /// Route one inbound relay message.
    pub fn handle(&mut self, message: ServerMessage) -> SessionEvent {
        match message {
            ServerMessage::UserJoined { role, message } => {
                match self.matchmaker.on_paired(&mut self.session, role, &message) {
                    Some(role) => {
                        if !self.sync.pair(role) && self.sync.role() != Some(role) {
                            warn!(
                                "Relay assigned {:?} but the game already seated us as {:?}",
                                role,
                                self.sync.role()
                            );
                        }
                        SessionEvent::Paired { role, message }
                    }
                    None => SessionEvent::Ignored,
                }
            }

            ServerMessage::ReceiveMove { .. } => self.handle_remote_move(&message),

            ServerMessage::PeerLeft { participant_id } => {
                if self.is_over() {
                    return SessionEvent::Ignored;
                }
                info!("Opponent {} left the room", participant_id);
                self.abandoned = true;
                self.leave();
                SessionEvent::Abandoned
            }

            ServerMessage::Error { message } => {
                warn!("Relay error: {}", message);
                SessionEvent::RelayError(message)
            }

            ServerMessage::Pong => SessionEvent::Ignored,
        }
    }

    fn handle_remote_move(&mut self, message: &ServerMessage) -> SessionEvent {
        let Some(room) = self.session.room_name().cloned() else {
            debug!("Move received before joining a room");
            return SessionEvent::Ignored;
        };
        let Some(remote) = self
            .relay
            .on_move_received(message, &room, self.session.participant_id())
        else {
            return SessionEvent::Ignored;
        };

        match self.sync.apply_remote_move(&remote) {
            Ok(outcome) => {
                if let Some(role) = self.sync.role() {
                    // A first move can seat us before the confirmation arrives
                    if self.session.mark_paired(role) {
                        info!("Seated as {} by the opening move", role.color_name());
                    }
                }
                match outcome {
                    Some(outcome) => {
                        self.leave();
                        SessionEvent::Finished(outcome)
                    }
                    None => SessionEvent::OpponentMoved(self.view()),
                }
            }
            Err(Rejected::DesyncDetected) => {
                error!("Session desynced in room {}, discarding", room);
                self.leave();
                SessionEvent::Broken
            }
            Err(reason) => {
                debug!("Ignoring remote move: {}", reason);
                SessionEvent::Ignored
            }
        }
    }

    /// Validate a move the local player made and forward it on success.
    pub fn attempt_move(&mut self, request: MoveRequest) -> MoveVerdict {
        if self.abandoned {
            return MoveVerdict::RolledBack {
                view: self.view(),
                reason: Rejected::GameOver,
            };
        }

        let message = match self.sync.apply_local_move(request) {
            Ok(message) => message,
            Err(reason) => {
                return MoveVerdict::RolledBack {
                    view: self.view(),
                    reason,
                }
            }
        };

        if let Some(room) = self.session.room_name() {
            if let Err(e) = self
                .relay
                .send_move(&message, room, self.session.participant_id())
            {
                // The opponent never sees this move, so the game cannot go on
                error!("Failed to send move {}: {}", request, e);
                self.abandoned = true;
                return MoveVerdict::RolledBack {
                    view: self.view(),
                    reason: Rejected::ConnectionLost,
                };
            }
        }
        if self.sync.state().is_terminal() {
            self.leave();
        }

        MoveVerdict::Confirmed(self.view())
    }

    fn leave(&mut self) {
        if self.left_room {
            return;
        }
        self.left_room = true;
        if let Err(e) = self.matchmaker.leave_room() {
            debug!("Could not send leave request: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ParticipantId;
    use crate::protocol::ClientMessage;
    use crate::transport::RecordingOutbound;

    fn joined(role: Role) -> (GameSession<RecordingOutbound>, RecordingOutbound) {
        let outbound = RecordingOutbound::new();
        let mut game = GameSession::new(Participant::new(), outbound.clone());
        game.join("r1").unwrap();
        game.handle(ServerMessage::UserJoined {
            role,
            message: "paired".to_string(),
        });
        outbound.take();
        (game, outbound)
    }

    fn request(text: &str) -> MoveRequest {
        MoveRequest::from_coordinates(text).unwrap()
    }

    #[test]
    fn test_attempt_move_sends() {
        let (mut game, outbound) = joined(Role::FirstMover);

        let verdict = game.attempt_move(request("e2e4"));

        assert!(verdict.is_confirmed());
        assert!(!verdict.view().my_turn);
        assert!(matches!(
            outbound.sent().as_slice(),
            [ClientMessage::SendMove { .. }]
        ));
    }

    #[test]
    fn test_rejected_move_rolls_back() {
        let (mut game, outbound) = joined(Role::SecondMover);
        let before = game.view();

        let verdict = game.attempt_move(request("e7e5"));

        assert_eq!(
            verdict,
            MoveVerdict::RolledBack {
                view: before,
                reason: Rejected::NotYourTurn
            }
        );
        assert!(outbound.sent().is_empty());
    }

    #[test]
    fn test_duplicate_confirmation_ignored() {
        let (mut game, _) = joined(Role::FirstMover);
        let event = game.handle(ServerMessage::UserJoined {
            role: Role::SecondMover,
            message: "again".to_string(),
        });
        assert_eq!(event, SessionEvent::Ignored);
        assert_eq!(game.sync().role(), Some(Role::FirstMover));
    }

    #[test]
    fn test_peer_left_abandons() {
        let (mut game, outbound) = joined(Role::FirstMover);

        let event = game.handle(ServerMessage::PeerLeft {
            participant_id: ParticipantId::random(),
        });

        assert_eq!(event, SessionEvent::Abandoned);
        assert!(game.is_over());
        assert_eq!(outbound.sent(), vec![ClientMessage::LeaveRoom]);
        assert!(!game.attempt_move(request("e2e4")).is_confirmed());
    }

    #[test]
    fn test_abandoned_view_is_not_playable() {
        let (mut game, _) = joined(Role::FirstMover);
        assert!(game.view().my_turn);

        game.handle(ServerMessage::PeerLeft {
            participant_id: ParticipantId::random(),
        });

        let view = game.view();
        assert_eq!(view.status, ViewStatus::Abandoned);
        assert!(!view.my_turn);
    }

    #[test]
    fn test_failed_send_rolls_back() {
        let (mut game, outbound) = joined(Role::FirstMover);
        outbound.close();

        let verdict = game.attempt_move(request("e2e4"));

        assert!(!verdict.is_confirmed());
        assert!(matches!(
            verdict,
            MoveVerdict::RolledBack {
                reason: Rejected::ConnectionLost,
                ..
            }
        ));
        assert_eq!(verdict.view().status, ViewStatus::Abandoned);
        assert!(!verdict.view().my_turn);
        assert!(game.is_over());
    }

    #[test]
    fn test_paired_event_carries_relay_message() {
        let outbound = RecordingOutbound::new();
        let mut game = GameSession::new(Participant::new(), outbound);
        game.join("r1").unwrap();

        let event = game.handle(ServerMessage::UserJoined {
            role: Role::SecondMover,
            message: "Joined r1. You play Black.".to_string(),
        });

        assert_eq!(
            event,
            SessionEvent::Paired {
                role: Role::SecondMover,
                message: "Joined r1. You play Black.".to_string(),
            }
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Paired"]["message"], "Joined r1. You play Black.");
    }

    #[test]
    fn test_desync_breaks_session() {
        let (mut game, outbound) = joined(Role::SecondMover);
        let bogus = ServerMessage::ReceiveMove {
            room_name: RoomName::new("r1").unwrap(),
            participant_id: ParticipantId::random(),
            mv: request("e2e5").to_move(),
            position_after: None,
            your_turn: true,
        };

        assert_eq!(game.handle(bogus), SessionEvent::Broken);
        assert_eq!(game.sync().phase(), Phase::Desynced);
        assert_eq!(game.view().status, ViewStatus::Broken);
        assert!(game.is_over());
        assert_eq!(outbound.sent(), vec![ClientMessage::LeaveRoom]);
    }

    #[test]
    fn test_move_before_join_ignored() {
        let mut game = GameSession::new(Participant::new(), RecordingOutbound::new());
        let stray = ServerMessage::ReceiveMove {
            room_name: RoomName::new("r1").unwrap(),
            participant_id: ParticipantId::random(),
            mv: request("e2e4").to_move(),
            position_after: None,
            your_turn: true,
        };
        assert_eq!(game.handle(stray), SessionEvent::Ignored);
        assert_eq!(game.sync().phase(), Phase::Unpaired);
    }
}
