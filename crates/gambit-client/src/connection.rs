//! Relay connection with a single inbound subscription.
//!
//! The connection hands out any number of cloneable [`RelayHandle`]s for
//! sending, but inbound messages can be subscribed to exactly once. The
//! [`Subscription`] lives as long as the session that owns it; dropping it
//! stops delivery.

use futures_util::{SinkExt, StreamExt};
use gambit_core::{ClientMessage, Outbound, ServerMessage, TransportError};
use thiserror::Error;
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("inbound messages are already subscribed")]
    AlreadySubscribed,

    #[error("connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Cloneable sending side of a relay connection.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl Outbound for RelayHandle {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// The one receiver of inbound relay messages for a session.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Subscription {
    /// Next inbound message, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }
}

/// Far end of an in-memory connection, standing in for the relay.
#[derive(Debug)]
pub struct LoopbackEnd {
    /// Messages the client sent
    pub outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    /// Deliver a message to the client
    pub incoming: mpsc::UnboundedSender<ServerMessage>,
}

/// How long [`RelayConnection::close`] waits for queued messages to flush.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RelayConnection {
    handle: RelayHandle,
    inbound: Option<mpsc::UnboundedReceiver<ServerMessage>>,
    send_task: Option<JoinHandle<()>>,
    recv_task: Option<JoinHandle<()>>,
}

impl RelayConnection {
    /// Open a WebSocket connection to the relay at `url`.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _) = connect_async(url).await?;
        info!("Connected to relay at {}", url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerMessage>();

        // Forward outgoing messages from channel to WebSocket
        let send_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Ok(text) = serde_json::to_string(&msg) {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
            let _ = ws_sender.close().await;
        });

        let recv_task = tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            // Receiver gone means the session unsubscribed
                            if in_tx.send(server_msg).is_err() {
                                debug!("Subscription dropped, stopping relay reader");
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid message from relay: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            handle: RelayHandle { tx: out_tx },
            inbound: Some(in_rx),
            send_task: Some(send_task),
            recv_task: Some(recv_task),
        })
    }

    /// A connection whose far end is returned to the caller.
    pub fn in_memory() -> (Self, LoopbackEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connection = Self {
            handle: RelayHandle { tx: out_tx },
            inbound: Some(in_rx),
            send_task: None,
            recv_task: None,
        };
        let end = LoopbackEnd {
            outgoing: out_rx,
            incoming: in_tx,
        };
        (connection, end)
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Take the inbound stream. Succeeds once per connection.
    pub fn subscribe(&mut self) -> Result<Subscription, ClientError> {
        self.inbound
            .take()
            .map(|rx| Subscription { rx })
            .ok_or(ClientError::AlreadySubscribed)
    }

    /// Flush queued messages and close the socket.
    ///
    /// Every [`RelayHandle`] clone must be dropped first; the writer only
    /// stops once its queue has no senders left.
    pub async fn close(mut self) {
        let send_task = self.send_task.take();
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        // Drops our own sender and the inbound queue
        drop(self);

        let Some(mut task) = send_task else {
            return;
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await {
            Ok(_) => debug!("Relay connection closed"),
            Err(_) => {
                warn!("Timed out flushing messages to the relay");
                task.abort();
            }
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        for task in [self.send_task.take(), self.recv_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
