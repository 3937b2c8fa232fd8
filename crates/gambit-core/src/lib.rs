//! Gambit - turn synchronization for two-player chess over a relay
//!
//! This crate provides the client-side game logic for Gambit, including:
//! - A rule engine adapter over standard chess rules
//! - Participant identity and session bookkeeping
//! - The turn-synchronization state machine that keeps both peers converged
//! - Matchmaking and move relay clients speaking the relay wire protocol
//!
//! # Architecture
//!
//! Nothing here performs I/O. Outbound messages go through an [`Outbound`]
//! handle supplied at construction, and inbound relay messages are pushed in
//! by the owner of the connection. The same code therefore runs natively
//! behind a WebSocket connection or in the browser through WebAssembly.
//!
//! # Modules
//!
//! - [`engine`]: Rule engine trait and the chess implementation
//! - [`identity`]: Participant ids, roles and room names
//! - [`sync`]: Turn-synchronization state machine
//! - [`matchmaking`]: Join requests and pairing confirmation
//! - [`relay`]: Move encoding and inbound filtering
//! - [`presentation`]: Views and move requests exchanged with a renderer
//! - [`session`]: A participant's complete game session

pub mod engine;
pub mod identity;
pub mod matchmaking;
pub mod presentation;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod sync;
pub mod transport;
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use engine::{
    ChessEngine, ChessPosition, DrawReason, EngineError, Outcome, Promotion, RuleEngine, Square,
};
pub use identity::{Participant, ParticipantId, Role, RoomName, Session, SessionError};
pub use matchmaking::{Matchmaker, MatchmakingError};
pub use presentation::{BoardView, MoveRequest, MoveVerdict, Orientation, ViewStatus};
pub use protocol::{ClientMessage, Move, MoveMessage, ServerMessage};
pub use relay::MoveRelay;
pub use session::{GameSession, SessionEvent};
pub use sync::{GameState, Phase, Rejected, TurnSync};
pub use transport::{Outbound, RecordingOutbound, TransportError};
