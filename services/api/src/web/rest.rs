//! services/api/src/web/rest.rs
//!
//! The response envelope, the JSON views returned by every handler and the
//! master definition for the OpenAPI specification.

use axum::{http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use enclave_core::domain::{
    AccessLevel, AuthSession, CommandHistoryEntry, EventType, FilesystemNode, NodeType, Role,
    SecurityEvent, SecurityStats, TerminalSession, TerminalType, User,
};
use enclave_core::{CommandResult, TokenPair};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{auth, filesystem, security, terminal, users};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::change_password_handler,
        auth::verify_token_handler,
        terminal::create_session_handler,
        terminal::list_sessions_handler,
        terminal::get_session_handler,
        terminal::execute_command_handler,
        terminal::end_session_handler,
        filesystem::list_directory_handler,
        filesystem::get_node_handler,
        filesystem::create_node_handler,
        filesystem::update_node_handler,
        filesystem::delete_node_handler,
        security::logs_handler,
        security::stats_handler,
        security::active_sessions_handler,
        security::alert_handler,
        security::webhook_test_handler,
        users::list_users_handler,
        users::create_user_handler,
        users::get_user_handler,
        users::update_user_handler,
        users::delete_user_handler,
    ),
    components(
        schemas(
            MessageView, UserView, TokenView, AuthView, HistoryEntryView, TerminalSessionView,
            CommandResultView, NodeView, DirectoryListingView, SecurityEventView, StatsView,
            ActiveSessionView,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and token lifecycle."),
        (name = "terminal", description = "Terminal sessions and command execution."),
        (name = "filesystem", description = "The role-scoped virtual filesystem."),
        (name = "security", description = "Audit log and alerting (administrators only)."),
        (name = "users", description = "User administration."),
    )
)]
pub struct ApiDoc;

/// Declares the `bearer` scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Response Envelope
//=========================================================================================

/// Every response body: `{ success, data?, error? }`.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::ok(data))
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageView {
    pub message: String,
}

impl MessageView {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

//=========================================================================================
// Views
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[schema(value_type = String, example = "RESEARCHER")]
    pub role: Role,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            active: user.active,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: String,
}

impl From<TokenPair> for TokenView {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthView {
    pub user: UserView,
    pub tokens: TokenView,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryEntryView {
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl From<CommandHistoryEntry> for HistoryEntryView {
    fn from(entry: CommandHistoryEntry) -> Self {
        Self {
            command: entry.command,
            timestamp: entry.timestamp,
            success: entry.success,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSessionView {
    pub id: Uuid,
    #[schema(value_type = String, example = "FILESYSTEM")]
    pub terminal_type: TerminalType,
    pub current_directory: String,
    pub command_history: Vec<HistoryEntryView>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
}

impl From<TerminalSession> for TerminalSessionView {
    fn from(session: TerminalSession) -> Self {
        Self {
            id: session.id,
            terminal_type: session.terminal_type,
            current_directory: session.current_directory,
            command_history: session
                .command_history
                .into_iter()
                .map(HistoryEntryView::from)
                .collect(),
            started_at: session.started_at,
            last_activity: session.last_activity,
            active: session.active,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultView {
    pub session_id: Uuid,
    pub command: String,
    pub output: String,
    pub success: bool,
    pub current_directory: String,
    pub clear_screen: bool,
}

impl CommandResultView {
    pub fn new(session_id: Uuid, result: CommandResult) -> Self {
        Self {
            session_id,
            command: result.command,
            output: result.output,
            success: result.success,
            current_directory: result.current_directory,
            clear_screen: result.clear_screen,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    #[schema(value_type = String, example = "FILE")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub parent_id: Option<Uuid>,
    #[schema(value_type = String, example = "PUBLIC")]
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeView {
    /// Listings omit file bodies.
    pub fn summary(node: FilesystemNode) -> Self {
        let mut view = Self::from(node);
        view.content = None;
        view
    }
}

impl From<FilesystemNode> for NodeView {
    fn from(node: FilesystemNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            path: node.path,
            node_type: node.node_type,
            content: node.content,
            parent_id: node.parent_id,
            access_level: node.access_level,
            created_at: node.created_at,
            updated_at: node.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DirectoryListingView {
    pub path: String,
    pub entries: Vec<NodeView>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventView {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[schema(value_type = String, example = "ACCESS_DENIED")]
    pub event_type: EventType,
    pub description: String,
    pub ip_address: String,
    pub user_agent: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<SecurityEvent> for SecurityEventView {
    fn from(event: SecurityEvent) -> Self {
        Self {
            id: event.id,
            user_id: event.user_id,
            event_type: event.event_type,
            description: event.description,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            metadata: event.metadata,
            created_at: event.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    /// Event counts over the last 24 hours keyed by event type.
    pub events_last_24h: BTreeMap<String, i64>,
    pub active_auth_sessions: i64,
    pub active_terminal_sessions: i64,
    pub total_users: i64,
}

impl From<SecurityStats> for StatsView {
    fn from(stats: SecurityStats) -> Self {
        Self {
            events_last_24h: stats
                .events_last_24h
                .into_iter()
                .map(|(kind, count)| (kind.as_str().to_string(), count))
                .collect(),
            active_auth_sessions: stats.active_auth_sessions,
            active_terminal_sessions: stats.active_terminal_sessions,
            total_users: stats.total_users,
        }
    }
}

/// An active authentication session. Token hashes are never exposed.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthSession> for ActiveSessionView {
    fn from(session: AuthSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        }
    }
}

//=========================================================================================
// Health
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = MessageView))
)]
pub async fn health_handler() -> Json<ApiResponse<MessageView>> {
    ApiResponse::ok(MessageView::new("ENCLAVE is operational"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_fields() {
        let Json(body) = ApiResponse::ok(MessageView::new("hi"));
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["message"], "hi");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn stats_report_counts_by_event_name() {
        let view = StatsView::from(SecurityStats {
            events_last_24h: vec![(EventType::AccessDenied, 3), (EventType::Login, 0)],
            active_auth_sessions: 1,
            active_terminal_sessions: 2,
            total_users: 4,
        });
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["eventsLast24h"]["ACCESS_DENIED"], 3);
        assert_eq!(json["eventsLast24h"]["LOGIN"], 0);
        assert_eq!(json["totalUsers"], 4);
    }
}
