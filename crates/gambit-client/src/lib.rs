//! Gambit client: relay connection and session event loop.
//!
//! - [`connection`]: WebSocket and in-memory relay connections
//! - [`runner`]: the single-task loop driving a [`gambit_core::GameSession`]
//! - [`render`]: terminal rendering of board views
//! - [`config`]: environment configuration

pub mod config;
pub mod connection;
pub mod render;
pub mod runner;

pub use config::Config;
pub use connection::{ClientError, LoopbackEnd, RelayConnection, RelayHandle, Subscription};
pub use runner::{run_session, Exit, Update};
