//! Outbound transport seam.
//!
//! The matchmaking and move relay clients send through an explicitly
//! constructed handle rather than a shared global connection. Inbound
//! messages are pushed into [`crate::session::GameSession::handle`] by
//! whoever owns the subscription.

use crate::protocol::ClientMessage;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Fire-and-forget sink for client messages.
pub trait Outbound {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError>;
}

/// Outbound handle that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutbound {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    sent: Vec<ClientMessage>,
    closed: bool,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.lock().sent.clone()
    }

    pub fn last_sent(&self) -> Option<ClientMessage> {
        self.lock().sent.last().cloned()
    }

    /// Drain the recorded messages.
    pub fn take(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Make every later send fail as if the connection dropped.
    pub fn close(&self) {
        self.lock().closed = true;
    }
}

impl Outbound for RecordingOutbound {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::ConnectionClosed);
        }
        inner.sent.push(message);
        Ok(())
    }
}
