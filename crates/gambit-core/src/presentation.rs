//! The two calls exchanged with a board renderer.
//!
//! Out: a read-only [`BoardView`] snapshot. In: a [`MoveRequest`] for an
//! attempted move. A renderer that shows a move before it is confirmed gets a
//! [`MoveVerdict`] back telling it whether to keep or roll back the display.

use crate::engine::{EngineError, Outcome, Promotion, RuleEngine, Square};
use crate::identity::Role;
use crate::protocol::Move;
use crate::sync::{Phase, Rejected, TurnSync};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A move attempt reported by the renderer. Promotion defaults to queen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    #[serde(default)]
    pub promotion: Promotion,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: Promotion::default(),
        }
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, EngineError> {
        Ok(Self::new(from.parse()?, to.parse()?))
    }

    /// Parse coordinate notation such as `e2e4` or `e7e8n`.
    pub fn from_coordinates(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(EngineError::InvalidSquare(text.to_string()));
        }
        let mut request = Self::parse(&text[0..2], &text[2..4])?;
        if let Some(piece) = text.chars().nth(4) {
            request.promotion = match piece.to_ascii_lowercase() {
                'q' => Promotion::Queen,
                'r' => Promotion::Rook,
                'b' => Promotion::Bishop,
                'n' => Promotion::Knight,
                _ => return Err(EngineError::InvalidSquare(text.to_string())),
            };
        }
        Ok(request)
    }

    pub fn to_move(self) -> Move {
        Move {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

/// Which side of the board faces the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    White,
    Black,
}

impl From<Role> for Orientation {
    fn from(role: Role) -> Self {
        match role {
            Role::FirstMover => Orientation::White,
            Role::SecondMover => Orientation::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewStatus {
    WaitingForOpponent,
    Playing,
    Finished(Outcome),
    /// The session desynced and must be discarded
    Broken,
    /// The opponent left or the relay connection was lost
    Abandoned,
}

/// Snapshot handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    /// Serialized position (FEN for chess)
    pub position: String,
    pub orientation: Orientation,
    pub my_turn: bool,
    pub status: ViewStatus,
}

impl BoardView {
    pub fn of<E: RuleEngine>(sync: &TurnSync<E>) -> Self {
        let state = sync.state();
        let status = match state.phase() {
            Phase::Unpaired => ViewStatus::WaitingForOpponent,
            Phase::AwaitingMyMove | Phase::AwaitingOpponentMove => ViewStatus::Playing,
            Phase::Terminal(outcome) => ViewStatus::Finished(outcome),
            Phase::Desynced => ViewStatus::Broken,
        };
        Self {
            position: sync.serialized_position(),
            orientation: sync.role().map(Orientation::from).unwrap_or(Orientation::White),
            my_turn: state.active_turn(),
            status,
        }
    }
}

/// Answer to a provisional move shown by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveVerdict {
    /// Keep the move; render this view
    Confirmed(BoardView),
    /// Undo the provisional move and render this view instead
    RolledBack { view: BoardView, reason: Rejected },
}

impl MoveVerdict {
    pub fn view(&self) -> &BoardView {
        match self {
            MoveVerdict::Confirmed(view) => view,
            MoveVerdict::RolledBack { view, .. } => view,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, MoveVerdict::Confirmed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_parsing() {
        let request = MoveRequest::from_coordinates("e2e4").unwrap();
        assert_eq!(request.to_string(), "e2e4");
        assert_eq!(request.promotion, Promotion::Queen);

        let under = MoveRequest::from_coordinates("b7b8N").unwrap();
        assert_eq!(under.promotion, Promotion::Knight);

        assert!(MoveRequest::from_coordinates("e2").is_err());
        assert!(MoveRequest::from_coordinates("e2e4x").is_err());
        assert!(MoveRequest::from_coordinates("é2e4").is_err());
    }

    #[test]
    fn test_view_orientation() {
        let mut sync = TurnSync::standard();
        let waiting = BoardView::of(&sync);
        assert_eq!(waiting.status, ViewStatus::WaitingForOpponent);
        assert!(!waiting.my_turn);

        sync.pair(Role::SecondMover);
        let view = BoardView::of(&sync);
        assert_eq!(view.orientation, Orientation::Black);
        assert_eq!(view.status, ViewStatus::Playing);
        assert!(!view.my_turn);
    }
}
