//! crates/enclave_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP framework; the enums
//! carry serde derives because their upper-case names are the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of entries retained in a terminal session's history.
pub const HISTORY_LIMIT: usize = 100;

/// Returned when a stored or submitted enum value has no matching variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//=========================================================================================
// Roles and Clearances
//=========================================================================================

/// Coarse authorization tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Military,
    Researcher,
    MilitaryResearcher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Military => "MILITARY",
            Role::Researcher => "RESEARCHER",
            Role::MilitaryResearcher => "MILITARYRESEARCHER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MILITARY" => Ok(Role::Military),
            "RESEARCHER" => Ok(Role::Researcher),
            "MILITARYRESEARCHER" => Ok(Role::MilitaryResearcher),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role required to see a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessLevel {
    Public,
    Military,
    Researcher,
    Admin,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "PUBLIC",
            AccessLevel::Military => "MILITARY",
            AccessLevel::Researcher => "RESEARCHER",
            AccessLevel::Admin => "ADMIN",
        }
    }

    /// A node is visible when it is public, matches the requester's role, or the
    /// requester is an administrator. The combined MILITARYRESEARCHER role holds
    /// both the military and the research clearance.
    pub fn visible_to(self, role: Role) -> bool {
        match (self, role) {
            (AccessLevel::Public, _) | (_, Role::Admin) => true,
            (AccessLevel::Military, Role::Military | Role::MilitaryResearcher) => true,
            (AccessLevel::Researcher, Role::Researcher | Role::MilitaryResearcher) => true,
            _ => false,
        }
    }
}

impl FromStr for AccessLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(AccessLevel::Public),
            "MILITARY" => Ok(AccessLevel::Military),
            "RESEARCHER" => Ok(AccessLevel::Researcher),
            "ADMIN" => Ok(AccessLevel::Admin),
            _ => Err(ParseEnumError::new("access level", s)),
        }
    }
}

//=========================================================================================
// Users and Authentication Sessions
//=========================================================================================

/// Represents a user - used throughout the app. Never carries the password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login and password changes - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update applied by administrators. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

/// Network origin of a request, recorded on sessions and security events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Server-side record of an issued token pair. Only hashes are stored.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuthSession {
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub client: ClientInfo,
}

/// Replaces the token hashes of a session, but only if its refresh hash still
/// equals `expected_refresh_hash`.
#[derive(Debug, Clone)]
pub struct SessionRotation {
    pub session_id: Uuid,
    pub expected_refresh_hash: String,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub client: ClientInfo,
}

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub session_id: Uuid,
}

//=========================================================================================
// Terminal Sessions
//=========================================================================================

/// Which command table a terminal session dispatches to. Chosen when the
/// terminal is opened and independent of the user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TerminalType {
    Military,
    Researcher,
    Filesystem,
    Emergency,
}

impl TerminalType {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalType::Military => "MILITARY",
            TerminalType::Researcher => "RESEARCHER",
            TerminalType::Filesystem => "FILESYSTEM",
            TerminalType::Emergency => "EMERGENCY",
        }
    }
}

impl FromStr for TerminalType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MILITARY" => Ok(TerminalType::Military),
            "RESEARCHER" => Ok(TerminalType::Researcher),
            "FILESYSTEM" => Ok(TerminalType::Filesystem),
            "EMERGENCY" => Ok(TerminalType::Emergency),
            _ => Err(ParseEnumError::new("terminal type", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHistoryEntry {
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct TerminalSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub terminal_type: TerminalType,
    pub current_directory: String,
    pub command_history: Vec<CommandHistoryEntry>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
}

/// Everything a single executed command changes on its terminal session.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub entry: CommandHistoryEntry,
    pub new_directory: Option<String>,
}

impl TerminalSession {
    pub fn new(user_id: Uuid, terminal_type: TerminalType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            terminal_type,
            current_directory: "/".to_string(),
            command_history: Vec::new(),
            started_at: now,
            last_activity: now,
            active: true,
        }
    }

    /// Appends the entry, drops the oldest entries beyond [`HISTORY_LIMIT`],
    /// moves to the new directory if any and refreshes the activity timestamp.
    /// Both store adapters call this inside their atomic section.
    pub fn apply_command(&mut self, record: CommandRecord) {
        self.last_activity = record.entry.timestamp;
        self.command_history.push(record.entry);
        if self.command_history.len() > HISTORY_LIMIT {
            let overflow = self.command_history.len() - HISTORY_LIMIT;
            self.command_history.drain(..overflow);
        }
        if let Some(directory) = record.new_directory {
            self.current_directory = directory;
        }
    }
}

//=========================================================================================
// Virtual Filesystem
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    File,
    Directory,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::File => "FILE",
            NodeType::Directory => "DIRECTORY",
        }
    }
}

impl FromStr for NodeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Ok(NodeType::File),
            "DIRECTORY" => Ok(NodeType::Directory),
            _ => Err(ParseEnumError::new("node type", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemNode {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub node_type: NodeType,
    pub content: Option<String>,
    pub parent_id: Option<Uuid>,
    pub access_level: AccessLevel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilesystemNode {
    pub fn is_directory(&self) -> bool {
        self.node_type == NodeType::Directory
    }
}

#[derive(Debug, Clone)]
pub struct NewFilesystemNode {
    pub name: String,
    pub path: String,
    pub node_type: NodeType,
    pub content: Option<String>,
    pub parent_id: Option<Uuid>,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub content: Option<String>,
    pub access_level: Option<AccessLevel>,
}

//=========================================================================================
// Security Events
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Login,
    Logout,
    Command,
    AccessDenied,
    Suspicious,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Login,
        EventType::Logout,
        EventType::Command,
        EventType::AccessDenied,
        EventType::Suspicious,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Login => "LOGIN",
            EventType::Logout => "LOGOUT",
            EventType::Command => "COMMAND",
            EventType::AccessDenied => "ACCESS_DENIED",
            EventType::Suspicious => "SUSPICIOUS",
        }
    }
}

impl FromStr for EventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOGIN" => Ok(EventType::Login),
            "LOGOUT" => Ok(EventType::Logout),
            "COMMAND" => Ok(EventType::Command),
            "ACCESS_DENIED" => Ok(EventType::AccessDenied),
            "SUSPICIOUS" => Ok(EventType::Suspicious),
            _ => Err(ParseEnumError::new("event type", s)),
        }
    }
}

/// An audit record. Append-only.
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: EventType,
    pub description: String,
    pub ip_address: String,
    pub user_agent: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            event_type,
            description: description.into(),
            ip_address: String::new(),
            user_agent: String::new(),
            metadata: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn from_client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Query parameters for browsing the audit log, newest first.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub user_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_type: None,
            user_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityStats {
    pub events_last_24h: Vec<(EventType, i64)>,
    pub active_auth_sessions: i64,
    pub active_terminal_sessions: i64,
    pub total_users: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn researcher_cannot_see_military_nodes() {
        assert!(AccessLevel::Public.visible_to(Role::Researcher));
        assert!(AccessLevel::Researcher.visible_to(Role::Researcher));
        assert!(!AccessLevel::Military.visible_to(Role::Researcher));
        assert!(!AccessLevel::Admin.visible_to(Role::Researcher));
    }

    #[test]
    fn admin_sees_every_access_level() {
        for level in [
            AccessLevel::Public,
            AccessLevel::Military,
            AccessLevel::Researcher,
            AccessLevel::Admin,
        ] {
            assert!(level.visible_to(Role::Admin));
        }
    }

    #[test]
    fn combined_role_holds_both_clearances() {
        assert!(AccessLevel::Military.visible_to(Role::MilitaryResearcher));
        assert!(AccessLevel::Researcher.visible_to(Role::MilitaryResearcher));
        assert!(!AccessLevel::Admin.visible_to(Role::MilitaryResearcher));
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("militaryresearcher".parse::<Role>(), Ok(Role::MilitaryResearcher));
        assert_eq!("Filesystem".parse::<TerminalType>(), Ok(TerminalType::Filesystem));
        assert_eq!("access_denied".parse::<EventType>(), Ok(EventType::AccessDenied));
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_in_upper_case() {
        let json = serde_json::to_string(&Role::MilitaryResearcher).unwrap();
        assert_eq!(json, "\"MILITARYRESEARCHER\"");
        let json = serde_json::to_string(&EventType::AccessDenied).unwrap();
        assert_eq!(json, "\"ACCESS_DENIED\"");
    }

    #[test]
    fn history_is_capped_and_keeps_newest_entries() {
        let start = Utc::now();
        let mut session = TerminalSession::new(Uuid::new_v4(), TerminalType::Filesystem, start);
        for i in 0..150 {
            session.apply_command(CommandRecord {
                entry: CommandHistoryEntry {
                    command: format!("cmd {i}"),
                    timestamp: start,
                    success: true,
                },
                new_directory: None,
            });
        }
        assert_eq!(session.command_history.len(), HISTORY_LIMIT);
        assert_eq!(session.command_history[0].command, "cmd 50");
        assert_eq!(session.command_history[99].command, "cmd 149");
    }

    #[test]
    fn apply_command_moves_directory_only_when_requested() {
        let now = Utc::now();
        let mut session = TerminalSession::new(Uuid::new_v4(), TerminalType::Filesystem, now);
        let entry = CommandHistoryEntry {
            command: "cd research".to_string(),
            timestamp: now,
            success: true,
        };
        session.apply_command(CommandRecord {
            entry: entry.clone(),
            new_directory: Some("/research".to_string()),
        });
        assert_eq!(session.current_directory, "/research");
        session.apply_command(CommandRecord {
            entry,
            new_directory: None,
        });
        assert_eq!(session.current_directory, "/research");
    }
}
