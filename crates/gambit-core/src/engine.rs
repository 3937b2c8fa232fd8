//! Rule engine adapter.
//!
//! The turn-synchronization layer never reasons about chess itself. It talks
//! to a [`RuleEngine`], which answers legality questions, applies moves and
//! reports terminal positions. [`ChessEngine`] is the shipped implementation,
//! backed by the `chess` crate.

use crate::identity::Role;
use chess::{Board, BoardStatus, ChessMove, Color, File, Piece, Rank};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors reported by a rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Illegal move {from}{to}")]
    IllegalMove { from: Square, to: Square },

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

/// A board square in algebraic notation (`a1`..`h8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    /// File index, 0 = a
    file: u8,
    /// Rank index, 0 = 1
    rank: u8,
}

impl Square {
    /// Create a square from zero-based file and rank indices.
    pub fn new(file: u8, rank: u8) -> Result<Self, EngineError> {
        if file < 8 && rank < 8 {
            Ok(Self { file, rank })
        } else {
            Err(EngineError::InvalidSquare(format!("({}, {})", file, rank)))
        }
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    fn to_chess(self) -> chess::Square {
        chess::Square::make_square(
            Rank::from_index(self.rank as usize),
            File::from_index(self.file as usize),
        )
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

impl FromStr for Square {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(EngineError::InvalidSquare(s.to_string()));
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return Err(EngineError::InvalidSquare(s.to_string()));
        }
        Ok(Self {
            file: file - b'a',
            rank: rank - b'1',
        })
    }
}

impl TryFrom<String> for Square {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

/// Piece a pawn turns into when it reaches the last rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Promotion {
    #[default]
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl Promotion {
    fn to_piece(self) -> Piece {
        match self {
            Promotion::Queen => Piece::Queen,
            Promotion::Rook => Piece::Rook,
            Promotion::Bishop => Piece::Bishop,
            Promotion::Knight => Piece::Knight,
        }
    }
}

/// Why a game was drawn without a stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    InsufficientMaterial,
    /// A hundred half-moves without a capture or pawn move
    FiftyMoveRule,
    ThreefoldRepetition,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawReason::InsufficientMaterial => write!(f, "insufficient material"),
            DrawReason::FiftyMoveRule => write!(f, "the fifty-move rule"),
            DrawReason::ThreefoldRepetition => write!(f, "threefold repetition"),
        }
    }
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The side that delivered mate wins
    Checkmate { winner: Role },
    /// Side to move has no legal move and is not in check
    Stalemate,
    Draw(DrawReason),
}

impl Outcome {
    pub fn winner(&self) -> Option<Role> {
        match self {
            Outcome::Checkmate { winner } => Some(*winner),
            Outcome::Stalemate | Outcome::Draw(_) => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Checkmate { winner } => write!(f, "checkmate, {} wins", winner.color_name()),
            Outcome::Stalemate => write!(f, "stalemate"),
            Outcome::Draw(reason) => write!(f, "draw by {}", reason),
        }
    }
}

/// Capability surface the turn-synchronization layer needs from a game.
///
/// Implementations must be deterministic: applying the same move to the same
/// position always yields the same result, and replaying a move that is no
/// longer legal must be refused.
pub trait RuleEngine {
    type Position: Clone + PartialEq + fmt::Debug;

    fn initial_position(&self) -> Self::Position;

    fn is_legal(
        &self,
        position: &Self::Position,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> bool;

    /// Apply a move, returning a new position. The input is left untouched.
    fn apply(
        &self,
        position: &Self::Position,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> Result<Self::Position, EngineError>;

    fn is_terminal(&self, position: &Self::Position) -> bool {
        self.outcome(position).is_some()
    }

    fn outcome(&self, position: &Self::Position) -> Option<Outcome>;

    /// Canonical string form, used for display and convergence checks.
    fn serialize(&self, position: &Self::Position) -> String;

    /// Role whose turn it is according to the position itself.
    fn current_mover(&self, position: &Self::Position) -> Role;
}

/// Half-moves without progress after which the game is drawn.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// A chess board plus the counters and history the draw rules need.
#[derive(Debug, Clone, PartialEq)]
pub struct ChessPosition {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    /// Hashes of every position since the last capture or pawn move
    history: Vec<u64>,
}

impl ChessPosition {
    fn new(board: Board, halfmove_clock: u32, fullmove_number: u32) -> Self {
        Self {
            board,
            halfmove_clock,
            fullmove_number,
            history: vec![board.get_hash()],
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    fn repetitions(&self) -> usize {
        let current = self.board.get_hash();
        self.history.iter().filter(|&&hash| hash == current).count()
    }

    /// Neither side can mate: bare kings, a single minor piece, or only
    /// bishops that all stand on one square colour.
    fn insufficient_material(&self) -> bool {
        let board = &self.board;
        let total = board.combined().popcnt();
        let minors = (*board.pieces(Piece::Knight) | *board.pieces(Piece::Bishop)).popcnt();
        let bishops = *board.pieces(Piece::Bishop);

        if total == 2 || (total == 3 && minors == 1) {
            return true;
        }
        if bishops.popcnt() + 2 != total {
            return false;
        }
        let mut colours = bishops
            .into_iter()
            .map(|sq| (sq.get_file().to_index() + sq.get_rank().to_index()) % 2);
        match colours.next() {
            Some(first) => colours.all(|colour| colour == first),
            None => false,
        }
    }
}

/// Standard chess rules via the `chess` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessEngine;

impl ChessEngine {
    pub fn new() -> Self {
        Self
    }

    /// Parse a FEN string into a position. Missing move counters default to
    /// `0 1`.
    pub fn position_from_fen(&self, fen: &str) -> Result<ChessPosition, EngineError> {
        let invalid = || EngineError::InvalidPosition(fen.to_string());
        let board = Board::from_str(fen).map_err(|_| invalid())?;
        let mut counters = fen.split_whitespace().skip(4);
        let halfmove_clock = match counters.next() {
            Some(field) => field.parse().map_err(|_| invalid())?,
            None => 0,
        };
        let fullmove_number = match counters.next() {
            Some(field) => field.parse().map_err(|_| invalid())?,
            None => 1,
        };
        Ok(ChessPosition::new(board, halfmove_clock, fullmove_number))
    }

    /// Build the concrete move, honouring the promotion hint only when a pawn
    /// lands on its last rank.
    fn to_chess_move(board: &Board, from: Square, to: Square, promotion: Promotion) -> ChessMove {
        let source = from.to_chess();
        let dest = to.to_chess();
        let last_rank = match board.side_to_move() {
            Color::White => 7,
            Color::Black => 0,
        };
        let promotes = board.piece_on(source) == Some(Piece::Pawn) && to.rank() == last_rank;
        ChessMove::new(source, dest, promotes.then(|| promotion.to_piece()))
    }
}

impl RuleEngine for ChessEngine {
    type Position = ChessPosition;

    fn initial_position(&self) -> ChessPosition {
        ChessPosition::new(Board::default(), 0, 1)
    }

    fn is_legal(
        &self,
        position: &ChessPosition,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> bool {
        let board = &position.board;
        board.legal(Self::to_chess_move(board, from, to, promotion))
    }

    fn apply(
        &self,
        position: &ChessPosition,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> Result<ChessPosition, EngineError> {
        let board = &position.board;
        let mv = Self::to_chess_move(board, from, to, promotion);
        if !board.legal(mv) {
            return Err(EngineError::IllegalMove { from, to });
        }

        let next = board.make_move_new(mv);
        let irreversible = board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            || board.piece_on(mv.get_dest()).is_some();
        let fullmove_number = match board.side_to_move() {
            Color::White => position.fullmove_number,
            Color::Black => position.fullmove_number + 1,
        };

        if irreversible {
            return Ok(ChessPosition::new(next, 0, fullmove_number));
        }
        let mut history = position.history.clone();
        history.push(next.get_hash());
        Ok(ChessPosition {
            board: next,
            halfmove_clock: position.halfmove_clock + 1,
            fullmove_number,
            history,
        })
    }

    fn outcome(&self, position: &ChessPosition) -> Option<Outcome> {
        match position.board.status() {
            BoardStatus::Stalemate => return Some(Outcome::Stalemate),
            // The side to move is mated, so the other side made the last move
            BoardStatus::Checkmate => {
                return Some(Outcome::Checkmate {
                    winner: self.current_mover(position).opponent(),
                })
            }
            BoardStatus::Ongoing => {}
        }

        if position.insufficient_material() {
            Some(Outcome::Draw(DrawReason::InsufficientMaterial))
        } else if position.halfmove_clock >= FIFTY_MOVE_HALFMOVES {
            Some(Outcome::Draw(DrawReason::FiftyMoveRule))
        } else if position.repetitions() >= 3 {
            Some(Outcome::Draw(DrawReason::ThreefoldRepetition))
        } else {
            None
        }
    }

    /// FEN with the tracked move counters.
    fn serialize(&self, position: &ChessPosition) -> String {
        let board = position.board.to_string();
        let fields: Vec<&str> = board.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            fields.join(" "),
            position.halfmove_clock,
            position.fullmove_number
        )
    }

    fn current_mover(&self, position: &ChessPosition) -> Role {
        match position.board.side_to_move() {
            Color::White => Role::FirstMover,
            Color::Black => Role::SecondMover,
        }
    }
}
