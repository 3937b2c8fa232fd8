//! WebSocket server and connection handling.

use crate::room::{RelayRoom, RoomError, RoomStatus};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use gambit_core::{ClientMessage, Move, ParticipantId, RoomName, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    /// All active rooms
    pub rooms: DashMap<RoomName, RelayRoom>,
    /// Mapping from connection ID to the room it sits in
    pub connection_rooms: DashMap<Uuid, RoomName>,
    /// Mapping from connection ID to its message sender
    pub senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            connection_rooms: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Register a connection and get the receiving end of its outbox.
    pub fn register(&self, connection_id: Uuid) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(connection_id, tx);
        rx
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, connection_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection_id) {
            let _ = sender.send(msg);
        }
    }

    fn send_error(&self, connection_id: Uuid, message: impl ToString) {
        self.send_to(
            connection_id,
            ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Seat a connection in a room, creating the room on first join.
    fn join_room(
        &self,
        connection_id: Uuid,
        room_name: RoomName,
        participant_id: ParticipantId,
    ) -> Result<(), RoomError> {
        if let Some(current) = self.connection_rooms.get(&connection_id) {
            if *current == room_name {
                return Err(RoomError::AlreadyInRoom);
            }
            let previous = current.clone();
            drop(current);
            // One room per connection; moving rooms leaves the old one
            self.leave_room(connection_id, &previous);
        }

        let mut room = self
            .rooms
            .entry(room_name.clone())
            .or_insert_with(|| RelayRoom::new(room_name.clone()));
        let paired = room.add_member(connection_id, participant_id)?;
        self.connection_rooms.insert(connection_id, room_name.clone());

        let confirmations = if paired { room.pairing_messages() } else { vec![] };
        drop(room); // Release lock before sending

        if paired {
            info!("Room {} paired", room_name);
        } else {
            info!("Participant {} waiting in room {}", participant_id, room_name);
        }
        for (target, msg) in confirmations {
            self.send_to(target, msg);
        }
        Ok(())
    }

    /// Forward a move to the other seat, verbatim apart from the turn hint.
    fn forward_move(
        &self,
        connection_id: Uuid,
        room_name: RoomName,
        participant_id: ParticipantId,
        mv: Move,
        position_after: Option<String>,
        active_turn_after_move: bool,
    ) -> Result<(), RoomError> {
        match self.connection_rooms.get(&connection_id) {
            Some(current) if *current == room_name => {}
            _ => return Err(RoomError::NotInRoom),
        }

        let peer = {
            let room = self.rooms.get(&room_name).ok_or(RoomError::NotInRoom)?;
            if room.status != RoomStatus::Paired {
                return Err(RoomError::NotPaired);
            }
            room.peer_of(connection_id)
                .map(|m| m.connection_id)
                .ok_or(RoomError::NotPaired)?
        };

        debug!("Relaying {}{} in room {}", mv.from, mv.to, room_name);
        self.send_to(
            peer,
            ServerMessage::ReceiveMove {
                room_name,
                participant_id,
                mv,
                position_after,
                your_turn: !active_turn_after_move,
            },
        );
        Ok(())
    }

    /// Remove a connection from its room and tell the other seat.
    fn leave_room(&self, connection_id: Uuid, room_name: &RoomName) {
        self.connection_rooms.remove(&connection_id);

        let (left, peer, is_empty) = {
            let Some(mut room) = self.rooms.get_mut(room_name) else {
                return;
            };
            let left = room.remove_member(connection_id).ok();
            let peer = room.members.first().map(|m| m.connection_id);
            (left, peer, room.is_empty())
        };

        if is_empty {
            self.rooms.remove(room_name);
            info!("Room {} removed", room_name);
        }
        if let (Some(left), Some(peer)) = (left, peer) {
            self.send_to(
                peer,
                ServerMessage::PeerLeft {
                    participant_id: left.participant_id,
                },
            );
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Gambit relay listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();
    let mut rx = state.register(connection_id);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(connection_id, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, e);
                    state.send_error(connection_id, format!("Invalid message: {}", e));
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    handle_disconnect(connection_id, &state);
    state.senders.remove(&connection_id);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Handle a client message.
pub fn handle_message(connection_id: Uuid, msg: ClientMessage, state: &ServerState) {
    match msg {
        ClientMessage::JoinRoom {
            room_name,
            participant_id,
        } => {
            if let Err(e) = state.join_room(connection_id, room_name, participant_id) {
                state.send_error(connection_id, e);
            }
        }

        ClientMessage::SendMove {
            room_name,
            participant_id,
            mv,
            position_after,
            active_turn_after_move,
        } => {
            if let Err(e) = state.forward_move(
                connection_id,
                room_name,
                participant_id,
                mv,
                position_after,
                active_turn_after_move,
            ) {
                state.send_error(connection_id, e);
            }
        }

        ClientMessage::LeaveRoom => {
            let room_name = state
                .connection_rooms
                .get(&connection_id)
                .map(|r| r.clone());
            if let Some(room_name) = room_name {
                state.leave_room(connection_id, &room_name);
            }
        }

        ClientMessage::Ping => {
            state.send_to(connection_id, ServerMessage::Pong);
        }
    }
}

/// Handle connection drop.
fn handle_disconnect(connection_id: Uuid, state: &ServerState) {
    let room_name = state
        .connection_rooms
        .get(&connection_id)
        .map(|r| r.clone());
    if let Some(room_name) = room_name {
        state.leave_room(connection_id, &room_name);
    }
}
