//! Turn-synchronization state machine.
//!
//! Every move, local or remote, goes through the same rule engine before it
//! touches the canonical [`GameState`]. Remote moves are re-validated against
//! the local position and never adopted from the sender's claims, so a buggy
//! or malicious peer can only break the session, not silently diverge it.
//!
//! The transition logic lives in the pure [`transition`] function, which
//! builds a fresh state instead of mutating the previous one. [`TurnSync`]
//! owns the canonical state and is the only thing that swaps it.

use crate::engine::{ChessEngine, Outcome, RuleEngine};
use crate::identity::Role;
use crate::presentation::MoveRequest;
use crate::protocol::{Move, MoveMessage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a move was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejected {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Illegal move")]
    IllegalMove,

    /// A remote move failed re-validation. Fatal to the session.
    #[error("Remote move failed validation, game state has diverged")]
    DesyncDetected,

    #[error("Game is over")]
    GameOver,

    #[error("Session is broken after a desync")]
    SessionBroken,

    /// The move could not be delivered to the opponent.
    #[error("Connection to the relay was lost")]
    ConnectionLost,
}

impl Rejected {
    /// Whether the session can continue after this rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Rejected::DesyncDetected | Rejected::SessionBroken | Rejected::ConnectionLost
        )
    }
}

/// Protocol phase of the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for the relay to pair us with an opponent
    Unpaired,
    AwaitingMyMove,
    AwaitingOpponentMove,
    /// Absorbing: the game ended normally
    Terminal(Outcome),
    /// Absorbing: a remote move failed re-validation
    Desynced,
}

/// Canonical local game state.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState<P> {
    position: P,
    active_turn: bool,
    phase: Phase,
}

impl<P: Clone> GameState<P> {
    pub fn new(position: P) -> Self {
        Self {
            position,
            active_turn: false,
            phase: Phase::Unpaired,
        }
    }

    pub fn position(&self) -> &P {
        &self.position
    }

    /// True when it is this participant's turn.
    pub fn active_turn(&self) -> bool {
        self.active_turn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal(_))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn with_phase(&self, position: P, phase: Phase) -> Self {
        Self {
            position,
            active_turn: phase == Phase::AwaitingMyMove,
            phase,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Paired(Role),
    LocalMove(MoveRequest),
    RemoteMove(MoveMessage),
}

/// Side effects the caller has to carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send this move to the opponent
    Transmit(MoveMessage),
    /// The game just ended
    Finished(Outcome),
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<P> {
    pub state: GameState<P>,
    pub role: Option<Role>,
    pub effects: Vec<Effect>,
}

/// Compute the next state for an event. Never mutates `state`.
pub fn transition<E: RuleEngine>(
    engine: &E,
    state: &GameState<E::Position>,
    role: Option<Role>,
    event: SyncEvent,
) -> Result<Transition<E::Position>, Rejected> {
    match event {
        SyncEvent::Paired(assigned) => Ok(pair(state, role, assigned)),
        SyncEvent::LocalMove(request) => local_move(engine, state, role, request),
        SyncEvent::RemoteMove(message) => remote_move(engine, state, role, message),
    }
}

fn pair<P: Clone>(state: &GameState<P>, role: Option<Role>, assigned: Role) -> Transition<P> {
    if state.phase != Phase::Unpaired {
        return Transition {
            state: state.clone(),
            role,
            effects: vec![],
        };
    }

    let phase = match assigned {
        Role::FirstMover => Phase::AwaitingMyMove,
        Role::SecondMover => Phase::AwaitingOpponentMove,
    };
    Transition {
        state: state.with_phase(state.position.clone(), phase),
        role: Some(assigned),
        effects: vec![],
    }
}

fn check_open(phase: Phase) -> Result<(), Rejected> {
    match phase {
        Phase::Terminal(_) => Err(Rejected::GameOver),
        Phase::Desynced => Err(Rejected::SessionBroken),
        _ => Ok(()),
    }
}

/// Phase reached once a move has produced `position`.
fn phase_after<E: RuleEngine>(engine: &E, position: &E::Position, local_moved: bool) -> Phase {
    match engine.outcome(position) {
        Some(outcome) => Phase::Terminal(outcome),
        None if local_moved => Phase::AwaitingOpponentMove,
        None => Phase::AwaitingMyMove,
    }
}

fn local_move<E: RuleEngine>(
    engine: &E,
    state: &GameState<E::Position>,
    role: Option<Role>,
    request: MoveRequest,
) -> Result<Transition<E::Position>, Rejected> {
    check_open(state.phase)?;
    let role = match (state.phase, role) {
        (Phase::AwaitingMyMove, Some(role)) => role,
        _ => return Err(Rejected::NotYourTurn),
    };
    if engine.current_mover(&state.position) != role {
        return Err(Rejected::NotYourTurn);
    }

    let mv = request.to_move();
    if !engine.is_legal(&state.position, mv.from, mv.to, mv.promotion) {
        return Err(Rejected::IllegalMove);
    }
    let position = engine
        .apply(&state.position, mv.from, mv.to, mv.promotion)
        .map_err(|_| Rejected::IllegalMove)?;

    let phase = phase_after(engine, &position, true);
    let message = MoveMessage {
        mv,
        position_after: Some(engine.serialize(&position)),
    };
    let mut effects = vec![Effect::Transmit(message)];
    if let Phase::Terminal(outcome) = phase {
        effects.push(Effect::Finished(outcome));
    }

    Ok(Transition {
        state: state.with_phase(position, phase),
        role: Some(role),
        effects,
    })
}

fn remote_move<E: RuleEngine>(
    engine: &E,
    state: &GameState<E::Position>,
    role: Option<Role>,
    message: MoveMessage,
) -> Result<Transition<E::Position>, Rejected> {
    check_open(state.phase)?;
    let role = match (state.phase, role) {
        (Phase::AwaitingOpponentMove, Some(role)) => role,
        // A first move arriving before the pairing confirmation seats us
        // as second mover.
        (Phase::Unpaired, _) if engine.current_mover(&state.position) == Role::FirstMover => {
            Role::SecondMover
        }
        _ => return Err(Rejected::DesyncDetected),
    };
    if engine.current_mover(&state.position) != role.opponent() {
        return Err(Rejected::DesyncDetected);
    }

    let Move { from, to, promotion } = message.mv;
    let position = engine
        .apply(&state.position, from, to, promotion)
        .map_err(|_| Rejected::DesyncDetected)?;
    if let Some(claimed) = &message.position_after {
        if *claimed != engine.serialize(&position) {
            return Err(Rejected::DesyncDetected);
        }
    }

    let phase = phase_after(engine, &position, false);
    let effects = match phase {
        Phase::Terminal(outcome) => vec![Effect::Finished(outcome)],
        _ => vec![],
    };

    Ok(Transition {
        state: state.with_phase(position, phase),
        role: Some(role),
        effects,
    })
}

/// Owner of the canonical [`GameState`] for one session.
pub struct TurnSync<E: RuleEngine = ChessEngine> {
    engine: E,
    state: GameState<E::Position>,
    role: Option<Role>,
    applied_moves: u32,
}

impl TurnSync<ChessEngine> {
    /// A fresh game from the standard starting position.
    pub fn standard() -> Self {
        Self::new(ChessEngine::new())
    }
}

impl<E: RuleEngine> TurnSync<E> {
    pub fn new(engine: E) -> Self {
        let position = engine.initial_position();
        Self::with_position(engine, position)
    }

    /// Start from an arbitrary position, still unpaired.
    pub fn with_position(engine: E, position: E::Position) -> Self {
        Self {
            engine,
            state: GameState::new(position),
            role: None,
            applied_moves: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> &GameState<E::Position> {
        &self.state
    }

    /// Owned copy of the current state for readers outside the machine.
    pub fn snapshot(&self) -> GameState<E::Position> {
        self.state.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Number of moves applied in this session, both sides.
    pub fn applied_moves(&self) -> u32 {
        self.applied_moves
    }

    pub fn serialized_position(&self) -> String {
        self.engine.serialize(&self.state.position)
    }

    /// Seat the local participant. Returns false if already paired.
    pub fn pair(&mut self, role: Role) -> bool {
        let before = self.state.phase;
        let step = match transition(&self.engine, &self.state, self.role, SyncEvent::Paired(role)) {
            Ok(step) => step,
            Err(_) => return false,
        };
        if step.state.phase == before {
            debug!("Ignoring pairing as {:?}, phase is {:?}", role, before);
            return false;
        }

        if self.engine.current_mover(&step.state.position) != Role::FirstMover {
            warn!("Paired on a position where the first mover is not to move");
        }
        info!("Paired as {:?}", role);
        self.state = step.state;
        self.role = step.role;
        true
    }

    /// Validate and apply a move made on this side.
    pub fn apply_local_move(&mut self, request: MoveRequest) -> Result<MoveMessage, Rejected> {
        let event = SyncEvent::LocalMove(request);
        let step = transition(&self.engine, &self.state, self.role, event).map_err(|reason| {
            debug!("Local move {} rejected: {}", request, reason);
            reason
        })?;

        let mut transmit = None;
        for effect in step.effects {
            match effect {
                Effect::Transmit(message) => transmit = Some(message),
                Effect::Finished(outcome) => info!("Game over after local move: {}", outcome),
            }
        }
        self.state = step.state;
        self.role = step.role;
        self.applied_moves += 1;

        // Local moves always carry a message to send
        transmit.ok_or(Rejected::IllegalMove)
    }

    /// Re-validate and apply a move received from the opponent.
    ///
    /// Any `DesyncDetected` leaves the machine in [`Phase::Desynced`].
    pub fn apply_remote_move(&mut self, message: &MoveMessage) -> Result<Option<Outcome>, Rejected> {
        let event = SyncEvent::RemoteMove(message.clone());
        match transition(&self.engine, &self.state, self.role, event) {
            Ok(step) => {
                let outcome = step.state.outcome();
                if let Some(outcome) = outcome {
                    info!("Game over after remote move: {}", outcome);
                }
                self.state = step.state;
                self.role = step.role;
                self.applied_moves += 1;
                Ok(outcome)
            }
            Err(Rejected::DesyncDetected) => {
                warn!(
                    "Remote move {}{} failed validation against {}",
                    message.mv.from,
                    message.mv.to,
                    self.serialized_position()
                );
                self.state = self
                    .state
                    .with_phase(self.state.position.clone(), Phase::Desynced);
                Err(Rejected::DesyncDetected)
            }
            Err(reason) => {
                debug!("Remote move rejected: {}", reason);
                Err(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(from: &str, to: &str) -> MoveRequest {
        MoveRequest::parse(from, to).unwrap()
    }

    fn paired(role: Role) -> TurnSync {
        let mut sync = TurnSync::standard();
        assert!(sync.pair(role));
        sync
    }

    #[test]
    fn test_pairing_sets_turn() {
        let first = paired(Role::FirstMover);
        let second = paired(Role::SecondMover);

        assert_eq!(first.phase(), Phase::AwaitingMyMove);
        assert!(first.state().active_turn());
        assert_eq!(second.phase(), Phase::AwaitingOpponentMove);
        assert!(!second.state().active_turn());
    }

    #[test]
    fn test_duplicate_pairing_is_ignored() {
        let mut sync = paired(Role::SecondMover);
        assert!(!sync.pair(Role::FirstMover));
        assert_eq!(sync.role(), Some(Role::SecondMover));
        assert_eq!(sync.phase(), Phase::AwaitingOpponentMove);
    }

    #[test]
    fn test_unpaired_cannot_move() {
        let mut sync = TurnSync::standard();
        assert_eq!(
            sync.apply_local_move(request("e2", "e4")),
            Err(Rejected::NotYourTurn)
        );
        assert_eq!(sync.phase(), Phase::Unpaired);
        assert!(!sync.state().active_turn());
    }

    #[test]
    fn test_local_move_flips_turn() {
        let mut sync = paired(Role::FirstMover);
        let before = sync.snapshot();

        let message = sync.apply_local_move(request("e2", "e4")).unwrap();

        assert_eq!(message.mv.from.to_string(), "e2");
        assert_eq!(message.position_after, Some(sync.serialized_position()));
        assert_eq!(sync.phase(), Phase::AwaitingOpponentMove);
        assert!(!sync.state().active_turn());
        assert_ne!(sync.state().position(), before.position());
        // The snapshot taken earlier is a distinct value and kept its content
        assert_eq!(before.phase(), Phase::AwaitingMyMove);
    }

    #[test]
    fn test_illegal_local_move_keeps_state() {
        let mut sync = paired(Role::FirstMover);
        let before = sync.snapshot();

        assert_eq!(
            sync.apply_local_move(request("e2", "e5")),
            Err(Rejected::IllegalMove)
        );
        assert_eq!(sync.snapshot(), before);
        assert_eq!(sync.applied_moves(), 0);
    }

    #[test]
    fn test_out_of_turn_local_move() {
        let mut sync = paired(Role::SecondMover);
        let before = sync.snapshot();

        assert_eq!(
            sync.apply_local_move(request("e7", "e5")),
            Err(Rejected::NotYourTurn)
        );
        assert_eq!(sync.snapshot(), before);
    }

    #[test]
    fn test_remote_move_replay_is_desync() {
        let mut white = paired(Role::FirstMover);
        let mut black = paired(Role::SecondMover);

        let message = white.apply_local_move(request("e2", "e4")).unwrap();
        assert_eq!(black.apply_remote_move(&message), Ok(None));
        assert!(black.state().active_turn());

        assert_eq!(
            black.apply_remote_move(&message),
            Err(Rejected::DesyncDetected)
        );
        assert_eq!(black.phase(), Phase::Desynced);
        assert!(!black.state().active_turn());
        assert_eq!(
            black.apply_local_move(request("e7", "e5")),
            Err(Rejected::SessionBroken)
        );
    }

    #[test]
    fn test_local_replay_after_round_trip_is_illegal() {
        let mut white = paired(Role::FirstMover);
        let mut black = paired(Role::SecondMover);

        let opening = white.apply_local_move(request("e2", "e4")).unwrap();
        assert_eq!(
            white.apply_local_move(request("e2", "e4")),
            Err(Rejected::NotYourTurn)
        );
        black.apply_remote_move(&opening).unwrap();
        let reply = black.apply_local_move(request("e7", "e5")).unwrap();
        white.apply_remote_move(&reply).unwrap();

        let before = white.snapshot();
        assert_eq!(
            white.apply_local_move(request("e2", "e4")),
            Err(Rejected::IllegalMove)
        );
        assert_eq!(white.snapshot(), before);
        assert_eq!(white.applied_moves(), 2);
        assert!(white.state().active_turn());
    }

    #[test]
    fn test_tampered_position_is_desync() {
        let mut white = paired(Role::FirstMover);
        let mut black = paired(Role::SecondMover);
        let before = black.serialized_position();

        let mut message = white.apply_local_move(request("d2", "d4")).unwrap();
        message.position_after = Some("8/8/8/8/8/8/8/8 w - - 0 1".to_string());

        assert_eq!(
            black.apply_remote_move(&message),
            Err(Rejected::DesyncDetected)
        );
        assert_eq!(black.serialized_position(), before);
    }

    #[test]
    fn test_illegal_remote_move_is_desync() {
        let mut black = paired(Role::SecondMover);
        let message = MoveMessage {
            mv: request("e2", "e5").to_move(),
            position_after: None,
        };
        assert_eq!(
            black.apply_remote_move(&message),
            Err(Rejected::DesyncDetected)
        );
    }

    #[test]
    fn test_remote_move_seeds_pairing() {
        let mut white = paired(Role::FirstMover);
        let mut late = TurnSync::standard();

        let message = white.apply_local_move(request("g1", "f3")).unwrap();
        assert_eq!(late.apply_remote_move(&message), Ok(None));
        assert_eq!(late.role(), Some(Role::SecondMover));
        assert_eq!(late.phase(), Phase::AwaitingMyMove);
        assert_eq!(late.serialized_position(), white.serialized_position());
    }

    #[test]
    fn test_terminal_is_absorbing() {
        let mut white = paired(Role::FirstMover);
        let mut black = paired(Role::SecondMover);

        for (i, (from, to)) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")]
            .into_iter()
            .enumerate()
        {
            let (mover, receiver) = if i % 2 == 0 {
                (&mut white, &mut black)
            } else {
                (&mut black, &mut white)
            };
            let message = mover.apply_local_move(request(from, to)).unwrap();
            receiver.apply_remote_move(&message).unwrap();
        }

        let mate = Outcome::Checkmate {
            winner: Role::SecondMover,
        };
        assert_eq!(white.phase(), Phase::Terminal(mate));
        assert_eq!(black.phase(), Phase::Terminal(mate));
        assert!(!white.state().active_turn());
        assert!(!black.state().active_turn());

        let frozen = white.snapshot();
        assert_eq!(
            white.apply_local_move(request("e1", "f2")),
            Err(Rejected::GameOver)
        );
        let stray = MoveMessage {
            mv: request("a7", "a6").to_move(),
            position_after: None,
        };
        assert_eq!(white.apply_remote_move(&stray), Err(Rejected::GameOver));
        assert_eq!(white.snapshot(), frozen);
    }

    #[test]
    fn test_transition_is_pure() {
        let engine = ChessEngine::new();
        let state = GameState::new(engine.initial_position());

        let paired = transition(&engine, &state, None, SyncEvent::Paired(Role::FirstMover)).unwrap();
        let moved = transition(
            &engine,
            &paired.state,
            paired.role,
            SyncEvent::LocalMove(request("e2", "e4")),
        )
        .unwrap();

        assert_eq!(state.phase(), Phase::Unpaired);
        assert_eq!(paired.state.phase(), Phase::AwaitingMyMove);
        assert_eq!(paired.state.position(), &engine.initial_position());
        assert_eq!(moved.state.phase(), Phase::AwaitingOpponentMove);
        assert!(matches!(moved.effects.as_slice(), [Effect::Transmit(_)]));
    }
}
