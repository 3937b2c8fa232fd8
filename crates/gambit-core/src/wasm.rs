//! WebAssembly bindings for a browser board renderer.
//!
//! The JavaScript side owns the socket: it forwards every inbound relay
//! message to `handleMessage` and, after each call, drains `takeOutgoing`
//! and emits the returned messages.

use wasm_bindgen::prelude::*;

use crate::identity::Participant;
use crate::presentation::MoveRequest;
use crate::protocol::ServerMessage;
use crate::presentation::BoardView;
use crate::session::{GameSession, SessionEvent};
use serde::Serialize;
use crate::transport::RecordingOutbound;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// What `handleMessage` returns: the event and the view to render.
#[derive(Serialize)]
struct Handled {
    event: SessionEvent,
    view: BoardView,
}

/// WASM-exposed game session
#[wasm_bindgen]
pub struct WasmSession {
    game: GameSession<RecordingOutbound>,
    outbox: RecordingOutbound,
}

#[wasm_bindgen]
impl WasmSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmSession {
        let outbox = RecordingOutbound::new();
        WasmSession {
            game: GameSession::new(Participant::new(), outbox.clone()),
            outbox,
        }
    }

    #[wasm_bindgen(js_name = participantId)]
    pub fn participant_id(&self) -> String {
        self.game.session().participant_id().to_string()
    }

    /// Queue a join request for `room_name`
    pub fn join(&mut self, room_name: &str) -> Result<(), JsValue> {
        self.game
            .join(room_name)
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Feed one relay message (JSON); returns `{ event, view }` as JSON
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&mut self, message_json: &str) -> Result<String, JsValue> {
        let message: ServerMessage = serde_json::from_str(message_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid relay message: {}", e)))?;
        let handled = Handled {
            event: self.game.handle(message),
            view: self.game.view(),
        };
        serde_json::to_string(&handled).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Validate a dropped piece; returns the verdict as JSON
    #[wasm_bindgen(js_name = attemptMove)]
    pub fn attempt_move(&mut self, from: &str, to: &str) -> Result<String, JsValue> {
        let request = MoveRequest::parse(from, to).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let verdict = self.game.attempt_move(request);
        serde_json::to_string(&verdict).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Current board view as JSON
    #[wasm_bindgen(js_name = getView)]
    pub fn get_view(&self) -> String {
        serde_json::to_string(&self.game.view()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Drain queued client messages as a JSON array
    #[wasm_bindgen(js_name = takeOutgoing)]
    pub fn take_outgoing(&self) -> String {
        serde_json::to_string(&self.outbox.take()).unwrap_or_else(|_| "[]".to_string())
    }

    #[wasm_bindgen(js_name = isOver)]
    pub fn is_over(&self) -> bool {
        self.game.is_over()
    }
}

impl Default for WasmSession {
    fn default() -> Self {
        Self::new()
    }
}
