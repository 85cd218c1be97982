//! services/api/src/web/terminal.rs
//!
//! Terminal session endpoints. Command results are returned in the response
//! and also pushed to every WebSocket the user holds.

use axum::{extract::State, response::IntoResponse, Json};
use enclave_core::domain::TerminalType;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{CurrentUser, PathId, RequestClient, ValidatedJson};
use crate::web::protocol::ServerMessage;
use crate::web::rest::{ApiResponse, CommandResultView, MessageView, TerminalSessionView};
use crate::web::state::AppState;

/// Commands longer than this are rejected before reaching the interpreter.
pub const MAX_COMMAND_LENGTH: usize = 1024;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    /// One of MILITARY, RESEARCHER, FILESYSTEM or EMERGENCY.
    pub terminal_type: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ExecuteCommandRequest {
    pub command: String,
}

pub fn check_command_length(command: &str) -> Result<(), ApiError> {
    if command.chars().count() > MAX_COMMAND_LENGTH {
        return Err(ApiError::Validation(format!(
            "Command exceeds {MAX_COMMAND_LENGTH} characters"
        )));
    }
    Ok(())
}

/// POST /terminal/sessions - Open a terminal of the requested type.
#[utoipa::path(
    post,
    path = "/terminal/sessions",
    tag = "terminal",
    request_body = CreateTerminalRequest,
    responses(
        (status = 201, description = "Session opened", body = ApiResponse<TerminalSessionView>),
        (status = 400, description = "Unknown terminal type"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateTerminalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let terminal_type = req
        .terminal_type
        .parse::<TerminalType>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let session = state.terminals.open_session(user.user_id, terminal_type).await?;
    Ok(ApiResponse::created(TerminalSessionView::from(session)))
}

/// GET /terminal/sessions - The caller's active sessions.
#[utoipa::path(
    get,
    path = "/terminal/sessions",
    tag = "terminal",
    responses(
        (status = 200, description = "Active sessions, most recent first", body = ApiResponse<Vec<TerminalSessionView>>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<TerminalSessionView>>>, ApiError> {
    let sessions = state.terminals.list_sessions(user.user_id).await?;
    Ok(ApiResponse::ok(
        sessions.into_iter().map(TerminalSessionView::from).collect(),
    ))
}

/// GET /terminal/sessions/{id} - One session with its command history.
#[utoipa::path(
    get,
    path = "/terminal/sessions/{id}",
    tag = "terminal",
    params(("id" = Uuid, Path, description = "Terminal session id")),
    responses(
        (status = 200, description = "The session", body = ApiResponse<TerminalSessionView>),
        (status = 404, description = "No such active session for this user")
    ),
    security(("bearer" = []))
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathId(session_id): PathId,
) -> Result<Json<ApiResponse<TerminalSessionView>>, ApiError> {
    let session = state.terminals.get_session(session_id, user.user_id).await?;
    Ok(ApiResponse::ok(TerminalSessionView::from(session)))
}

/// POST /terminal/sessions/{id}/commands - Run a command.
///
/// Interpreter failures are reported with `success: false` in a 200 response.
#[utoipa::path(
    post,
    path = "/terminal/sessions/{id}/commands",
    tag = "terminal",
    params(("id" = Uuid, Path, description = "Terminal session id")),
    request_body = ExecuteCommandRequest,
    responses(
        (status = 200, description = "Command result", body = ApiResponse<CommandResultView>),
        (status = 400, description = "Command too long"),
        (status = 404, description = "No such active session for this user")
    ),
    security(("bearer" = []))
)]
pub async fn execute_command_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    RequestClient(client): RequestClient,
    PathId(session_id): PathId,
    ValidatedJson(req): ValidatedJson<ExecuteCommandRequest>,
) -> Result<Json<ApiResponse<CommandResultView>>, ApiError> {
    check_command_length(&req.command)?;
    let result = state
        .terminals
        .execute(session_id, &user, &req.command, &client)
        .await?;

    let delivered = state.realtime.publish(
        user.user_id,
        ServerMessage::CommandResult {
            session_id,
            command: result.command.clone(),
            output: result.output.clone(),
            success: result.success,
            current_directory: result.current_directory.clone(),
            clear_screen: result.clear_screen,
        },
    );
    debug!(session_id = %session_id, delivered, "Published command result");

    Ok(ApiResponse::ok(CommandResultView::new(session_id, result)))
}

/// DELETE /terminal/sessions/{id} - Close a session.
#[utoipa::path(
    delete,
    path = "/terminal/sessions/{id}",
    tag = "terminal",
    params(("id" = Uuid, Path, description = "Terminal session id")),
    responses(
        (status = 200, description = "Session ended", body = ApiResponse<MessageView>),
        (status = 404, description = "No such active session for this user")
    ),
    security(("bearer" = []))
)]
pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathId(session_id): PathId,
) -> Result<Json<ApiResponse<MessageView>>, ApiError> {
    state.terminals.end_session(session_id, user.user_id).await?;
    state
        .realtime
        .publish(user.user_id, ServerMessage::SessionEnded { session_id });
    Ok(ApiResponse::ok(MessageView::new("Terminal session ended")))
}
