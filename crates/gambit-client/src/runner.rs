//! Session event loop.
//!
//! One task drives a session: relay messages and local move attempts are
//! handled strictly one at a time, so the state machine never sees two
//! events at once. The loop owns the subscription and drops it on exit.

use crate::connection::Subscription;
use gambit_core::{
    GameSession, MoveRequest, MoveVerdict, Outbound, Outcome, RuleEngine, SessionEvent,
    ViewStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Something the renderer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Event(SessionEvent),
    Verdict(MoveVerdict),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Finished(Outcome),
    /// The session desynced
    Broken,
    /// The opponent left
    Abandoned,
    /// The relay connection closed
    Disconnected,
    /// The move source closed
    InputClosed,
}

fn exit_for<T: Outbound + Clone, E: RuleEngine>(game: &GameSession<T, E>) -> Option<Exit> {
    if !game.is_over() {
        return None;
    }
    Some(match game.view().status {
        ViewStatus::Finished(outcome) => Exit::Finished(outcome),
        ViewStatus::Broken => Exit::Broken,
        _ => Exit::Abandoned,
    })
}

/// Drive `game` until it ends or one of its inputs closes.
pub async fn run_session<T: Outbound + Clone, E: RuleEngine>(
    game: &mut GameSession<T, E>,
    mut subscription: Subscription,
    mut moves: mpsc::UnboundedReceiver<MoveRequest>,
    updates: mpsc::UnboundedSender<Update>,
) -> Exit {
    let exit = loop {
        tokio::select! {
            biased;

            inbound = subscription.recv() => {
                let Some(message) = inbound else {
                    break Exit::Disconnected;
                };
                let event = game.handle(message);
                if event != SessionEvent::Ignored {
                    let _ = updates.send(Update::Event(event));
                }
            }

            request = moves.recv() => {
                let Some(request) = request else {
                    break Exit::InputClosed;
                };
                let verdict = game.attempt_move(request);
                if let MoveVerdict::RolledBack { reason, .. } = &verdict {
                    debug!("Move {} rolled back: {}", request, reason);
                }
                let _ = updates.send(Update::Verdict(verdict));
            }
        }

        if let Some(exit) = exit_for(game) {
            break exit;
        }
    };

    info!("Session loop finished: {:?}", exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{LoopbackEnd, RelayConnection, RelayHandle};
    use gambit_core::{ClientMessage, Participant, ParticipantId, Role, RoomName, ServerMessage};

    fn setup() -> (
        GameSession<RelayHandle>,
        RelayConnection,
        LoopbackEnd,
    ) {
        let (connection, end) = RelayConnection::in_memory();
        let mut game = GameSession::new(Participant::new(), connection.handle());
        game.join("r1").unwrap();
        (game, connection, end)
    }

    fn opening(peer: ParticipantId) -> ServerMessage {
        ServerMessage::ReceiveMove {
            room_name: RoomName::new("r1").unwrap(),
            participant_id: peer,
            mv: MoveRequest::from_coordinates("e2e4").unwrap().to_move(),
            position_after: None,
            your_turn: true,
        }
    }

    #[tokio::test]
    async fn test_refreshes_apply_inbound_once() {
        let (mut game, mut connection, end) = setup();
        let subscription = connection.subscribe().unwrap();

        // Re-rendering never re-subscribes
        for _ in 0..50 {
            let _ = game.view();
            assert!(connection.subscribe().is_err());
        }

        end.incoming
            .send(ServerMessage::UserJoined {
                role: Role::SecondMover,
                message: "paired".to_string(),
            })
            .unwrap();
        end.incoming.send(opening(ParticipantId::random())).unwrap();

        let (moves_tx, moves_rx) = mpsc::unbounded_channel();
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        drop(moves_tx);

        let exit = run_session(&mut game, subscription, moves_rx, updates_tx).await;

        assert_eq!(exit, Exit::InputClosed);
        assert_eq!(game.sync().applied_moves(), 1);
        assert!(game.view().my_turn);
        assert_eq!(
            updates_rx.recv().await,
            Some(Update::Event(SessionEvent::Paired {
                role: Role::SecondMover,
                message: "paired".to_string(),
            }))
        );
        assert!(matches!(
            updates_rx.recv().await,
            Some(Update::Event(SessionEvent::OpponentMoved(_)))
        ));
    }

    #[tokio::test]
    async fn test_local_move_is_sent() {
        let (mut game, mut connection, mut end) = setup();
        let subscription = connection.subscribe().unwrap();
        end.incoming
            .send(ServerMessage::UserJoined {
                role: Role::FirstMover,
                message: "paired".to_string(),
            })
            .unwrap();

        let (moves_tx, moves_rx) = mpsc::unbounded_channel();
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        moves_tx
            .send(MoveRequest::from_coordinates("e7e5").unwrap())
            .unwrap();
        moves_tx
            .send(MoveRequest::from_coordinates("e2e4").unwrap())
            .unwrap();
        drop(moves_tx);

        run_session(&mut game, subscription, moves_rx, updates_tx).await;

        assert!(matches!(
            end.outgoing.recv().await,
            Some(ClientMessage::JoinRoom { .. })
        ));
        assert!(matches!(
            end.outgoing.recv().await,
            Some(ClientMessage::SendMove { .. })
        ));

        let mut verdicts = Vec::new();
        while let Ok(update) = updates_rx.try_recv() {
            if let Update::Verdict(verdict) = update {
                verdicts.push(verdict.is_confirmed());
            }
        }
        assert_eq!(verdicts, vec![false, true]);
    }

    #[tokio::test]
    async fn test_peer_leaving_ends_loop() {
        let (mut game, mut connection, mut end) = setup();
        let subscription = connection.subscribe().unwrap();
        end.incoming
            .send(ServerMessage::UserJoined {
                role: Role::FirstMover,
                message: "paired".to_string(),
            })
            .unwrap();
        end.incoming
            .send(ServerMessage::PeerLeft {
                participant_id: ParticipantId::random(),
            })
            .unwrap();

        let (_moves_tx, moves_rx) = mpsc::unbounded_channel();
        let (updates_tx, _updates_rx) = mpsc::unbounded_channel();

        let exit = run_session(&mut game, subscription, moves_rx, updates_tx).await;

        assert_eq!(exit, Exit::Abandoned);
        let mut sent = Vec::new();
        while let Ok(msg) = end.outgoing.try_recv() {
            sent.push(msg);
        }
        assert_eq!(sent.last(), Some(&ClientMessage::LeaveRoom));
    }

    #[tokio::test]
    async fn test_relay_hangup_disconnects() {
        let (mut game, mut connection, end) = setup();
        let subscription = connection.subscribe().unwrap();
        drop(end);

        let (_moves_tx, moves_rx) = mpsc::unbounded_channel();
        let (updates_tx, _updates_rx) = mpsc::unbounded_channel();

        let exit = run_session(&mut game, subscription, moves_rx, updates_tx).await;
        assert_eq!(exit, Exit::Disconnected);
    }
}
