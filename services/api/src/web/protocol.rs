//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the terminal client and the
//! API server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Keep-alive. Answered with `Pong`.
    Ping,

    /// Runs a command on one of the user's terminal sessions. The result is
    /// published to every connection the user holds.
    ExecuteCommand { session_id: Uuid, command: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Outcome of a command, whether it was sent over HTTP or this socket.
    CommandResult {
        session_id: Uuid,
        command: String,
        output: String,
        success: bool,
        current_directory: String,
        clear_screen: bool,
    },

    /// A terminal session was closed.
    SessionEnded { session_id: Uuid },

    Pong,

    /// Reports a problem with the last client message.
    Error { message: String },
}
