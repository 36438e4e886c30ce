//! Chat over WebSocket.
//!
//! Client frames (JSON text):
//!
//! - `{"type":"chat","workspaceId":..,"message":..,"requestId"?:..}`
//! - `{"type":"subscribe","workspaceId":..}` / `{"type":"unsubscribe",..}`
//!
//! Each chat is answered with `typing(true)`, then `response` (or `error`),
//! then `typing(false)`, all carrying the chat's `workspaceId` and
//! `requestId`. Chats run as independent tasks, so frames of different
//! requests may interleave. Subscribed sockets also receive `event` frames
//! for state changes and for chats sent by other clients.

use crate::error::ApiError;
use crate::state::AppState;
use aiw_orchestrator::{ChatOrigin, WorkspaceEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const OUTBOUND_BUFFER: usize = 64;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_handler))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ClientMessage {
    Chat {
        workspace_id: String,
        message: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    Subscribe {
        workspace_id: String,
    },
    Unsubscribe {
        workspace_id: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ServerMessage {
    Typing {
        status: bool,
        workspace_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Response {
        success: bool,
        response: String,
        timestamp: DateTime<Utc>,
        workspace_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Subscribed {
        workspace_id: String,
    },
    Unsubscribed {
        workspace_id: String,
    },
    Event {
        event: WorkspaceEvent,
    },
}

impl ServerMessage {
    fn typing(status: bool, workspace_id: &str, request_id: &Option<String>) -> Self {
        ServerMessage::Typing {
            status,
            workspace_id: workspace_id.to_string(),
            request_id: request_id.clone(),
        }
    }
}

type Subscriptions = Arc<Mutex<HashSet<String>>>;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let socket_id = state.next_socket_id();
    info!(socket_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let subscriptions = Subscriptions::default();

    // Single writer: every task that wants to talk to the client goes through `tx`.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(socket_id, "Failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let events_task = tokio::spawn(forward_events(
        state.orchestrator.events().subscribe(),
        subscriptions.clone(),
        tx.clone(),
        socket_id,
    ));

    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_client_frame(text.as_str(), &state, &subscriptions, &tx, socket_id)
                        .await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(socket_id, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    events_task.abort();

    // In-flight chats keep running; their replies are dropped with the channel.
    info!(socket_id, "WebSocket disconnected");
}

async fn handle_client_frame(
    text: &str,
    state: &AppState,
    subscriptions: &Subscriptions,
    tx: &mpsc::Sender<ServerMessage>,
    socket_id: u64,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(socket_id, "Malformed client frame: {}", e);
            let _ = tx
                .send(ServerMessage::Error {
                    error: "Invalid message format".to_string(),
                    workspace_id: None,
                    request_id: None,
                })
                .await;
            return;
        }
    };

    match message {
        ClientMessage::Chat {
            workspace_id,
            message,
            request_id,
        } => {
            tokio::spawn(run_chat(
                state.clone(),
                tx.clone(),
                socket_id,
                workspace_id,
                message,
                request_id,
            ));
        }
        ClientMessage::Subscribe { workspace_id } => {
            subscriptions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(workspace_id.clone());
            let _ = tx.send(ServerMessage::Subscribed { workspace_id }).await;
        }
        ClientMessage::Unsubscribe { workspace_id } => {
            subscriptions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&workspace_id);
            let _ = tx.send(ServerMessage::Unsubscribed { workspace_id }).await;
        }
    }
}

async fn run_chat(
    state: AppState,
    tx: mpsc::Sender<ServerMessage>,
    socket_id: u64,
    workspace_id: String,
    message: String,
    request_id: Option<String>,
) {
    let _ = tx
        .send(ServerMessage::typing(true, &workspace_id, &request_id))
        .await;

    let reply = match state
        .orchestrator
        .dispatch_chat_from(&workspace_id, &message, ChatOrigin::Socket(socket_id))
        .await
    {
        Ok(exchange) => ServerMessage::Response {
            success: exchange.success,
            response: exchange.response_text,
            timestamp: exchange.timestamp,
            workspace_id: workspace_id.clone(),
            request_id: request_id.clone(),
        },
        Err(e) => ServerMessage::Error {
            error: ApiError::from(e).message(),
            workspace_id: Some(workspace_id.clone()),
            request_id: request_id.clone(),
        },
    };

    let _ = tx.send(reply).await;
    let _ = tx
        .send(ServerMessage::typing(false, &workspace_id, &request_id))
        .await;
}

async fn forward_events(
    mut events: broadcast::Receiver<WorkspaceEvent>,
    subscriptions: Subscriptions,
    tx: mpsc::Sender<ServerMessage>,
    socket_id: u64,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                // The originating socket already has the reply.
                if let WorkspaceEvent::Chat {
                    origin: ChatOrigin::Socket(origin),
                    ..
                } = &event
                {
                    if *origin == socket_id {
                        continue;
                    }
                }

                let subscribed = subscriptions
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .contains(event.workspace_id());
                if subscribed && tx.send(ServerMessage::Event { event }).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(socket_id, skipped, "Event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat_frame() {
        let frame = r#"{"type":"chat","workspaceId":"demo","message":"hi","requestId":"r1"}"#;
        match serde_json::from_str::<ClientMessage>(frame).unwrap() {
            ClientMessage::Chat {
                workspace_id,
                message,
                request_id,
            } => {
                assert_eq!(workspace_id, "demo");
                assert_eq!(message, "hi");
                assert_eq!(request_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_request_id_is_optional() {
        let frame = r#"{"type":"chat","workspaceId":"demo","message":"hi"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(frame).unwrap(),
            ClientMessage::Chat { request_id: None, .. }
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"chat"}"#).is_err());
    }

    #[test]
    fn test_typing_frame_shape() {
        let frame = serde_json::to_value(ServerMessage::typing(true, "demo", &None)).unwrap();
        assert_eq!(
            frame,
            json!({"type": "typing", "status": true, "workspaceId": "demo"})
        );
    }
}
