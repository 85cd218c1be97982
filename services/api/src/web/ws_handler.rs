//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point and control loop for a WebSocket connection.
//! The socket is authenticated with `?token=` before the upgrade and then
//! joins the user's realtime room; a forwarding task relays room messages
//! while the main loop handles client messages.

use crate::error::ApiError;
use crate::web::{
    extract::RequestClient,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
    terminal::check_command_length,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use enclave_core::domain::{AuthContext, ClientInfo};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    RequestClient(client): RequestClient,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(ApiError::unauthenticated)?;
    let user = app_state.registry.authenticate(&token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, user, token, client)))
}

async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    user: AuthContext,
    token: String,
    client: ClientInfo,
) {
    info!(user_id = %user.user_id, ip = %client.ip_address, "WebSocket connection established");

    // The sender is shared between the forwarding task and direct replies.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let shutdown = CancellationToken::new();
    let forward_task = tokio::spawn(forward_room(
        app_state.realtime.subscribe(user.user_id),
        ws_sender.clone(),
        shutdown.clone(),
    ));

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let keep_open =
                    handle_text_message(text.as_str(), &app_state, &token, &client, &ws_sender).await;
                if !keep_open {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(user_id = %user.user_id, "Client sent close message");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = %user.user_id, "WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- Cleanup ---
    shutdown.cancel();
    if let Err(e) = forward_task.await {
        error!("Forwarding task panicked: {:?}", e);
    }
    app_state.realtime.release(user.user_id);
    info!(user_id = %user.user_id, "WebSocket connection closed");
}

/// Relays everything published to the user's room until shutdown.
async fn forward_room(
    mut room: broadcast::Receiver<ServerMessage>,
    ws_sender: WsSender,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = room.recv() => received,
        };
        match message {
            Ok(message) => {
                if !send(&ws_sender, &message).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "WebSocket subscriber lagged; messages dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Handles one client message. Returns `false` when the socket should close.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    token: &str,
    client: &ClientInfo,
    ws_sender: &WsSender,
) -> bool {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return send(ws_sender, &error_message("Malformed message")).await;
        }
    };

    match message {
        ClientMessage::Ping => send(ws_sender, &ServerMessage::Pong).await,
        ClientMessage::ExecuteCommand {
            session_id,
            command,
        } => {
            // The token may have been revoked since the upgrade.
            let user = match app_state.registry.authenticate(token).await {
                Ok(user) => user,
                Err(e) => {
                    warn!(session_id = %session_id, "Closing socket with revoked credentials: {}", e);
                    send(ws_sender, &error_message(&e.to_string())).await;
                    return false;
                }
            };
            if let Err(e) = check_command_length(&command) {
                return send(ws_sender, &error_message(&e.to_string())).await;
            }

            match app_state
                .terminals
                .execute(session_id, &user, &command, client)
                .await
            {
                Ok(result) => {
                    // Delivered to this socket through the room like any other.
                    app_state.realtime.publish(
                        user.user_id,
                        ServerMessage::CommandResult {
                            session_id,
                            command: result.command,
                            output: result.output,
                            success: result.success,
                            current_directory: result.current_directory,
                            clear_screen: result.clear_screen,
                        },
                    );
                    true
                }
                Err(e) => send(ws_sender, &error_message(&e.to_string())).await,
            }
        }
    }
}

fn error_message(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

/// Serializes and sends one message. Returns `false` if the socket is gone.
async fn send(ws_sender: &WsSender, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {:?}", e);
            return true;
        }
    };
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .is_ok()
}
