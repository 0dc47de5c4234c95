use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::app::SharedState;
use crate::events::{self, ConnectedPayload};

/// Actions an overlay page can send back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    Ping,
    /// Toast closed by the user.
    Dismiss,
    /// Toast clicked.
    Open,
    /// Acknowledge `id`, or the toast on screen when absent.
    MarkRead {
        #[serde(default)]
        id: Option<u64>,
    },
}

/// Parse an overlay message; unknown or malformed messages yield `None`.
pub fn parse_client_action(text: &str) -> Option<ClientAction> {
    serde_json::from_str(text).ok()
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe_ws();

    // Send connection confirmation followed by the current state.
    let client_id = uuid::Uuid::new_v4().to_string();
    let greeting = [
        events::envelope(
            events::CONNECTED,
            &ConnectedPayload {
                client_id: client_id.clone(),
            },
        ),
        events::envelope(events::CONNECTION_STATE, &state.session().state()),
    ];
    for message in greeting {
        if sender.send(Message::Text(message.into())).await.is_err() {
            return;
        }
    }

    tracing::info!("Overlay client connected: {}", client_id);

    // Forward broadcast messages to this client
    let mut send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Receive actions from this client
    let s = state.clone();
    let cid = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_client_message(&text, &s),
                Message::Close(_) => break,
                _ => {}
            }
        }
        tracing::info!("Overlay client disconnected: {}", cid);
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

fn handle_client_message(text: &str, state: &SharedState) {
    let Some(action) = parse_client_action(text) else {
        tracing::debug!("Ignoring overlay message: {text}");
        return;
    };

    let session = state.session();
    match action {
        ClientAction::Ping => {
            let _ = state
                .ws_sender()
                .send(serde_json::json!({ "type": events::PONG }).to_string());
        }
        ClientAction::Dismiss => {
            session.dismiss();
        }
        ClientAction::Open => {
            session.open();
        }
        ClientAction::MarkRead { id: Some(id) } => {
            session.mark_read(id);
        }
        ClientAction::MarkRead { id: None } => {
            session.mark_current_read();
        }
    }
}
