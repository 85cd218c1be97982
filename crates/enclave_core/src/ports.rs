//! crates/enclave_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases,
//! rate-limit caches or alert sinks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    AuthSession, CommandRecord, EventFilter, EventType, FilesystemNode, NewAuthSession,
    NewFilesystemNode, NewUser, NodeUpdate, SecurityEvent, SessionRotation, TerminalSession,
    TerminalType, User, UserCredentials, UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A unique field is already taken. Carries the field name.
    #[error("Conflict on {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Credential Store ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    async fn count_users(&self) -> PortResult<i64>;

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User>;

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> PortResult<()>;

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    // --- Session Registry ---
    async fn create_auth_session(&self, session: NewAuthSession) -> PortResult<AuthSession>;

    async fn find_active_session_by_access_hash(
        &self,
        access_token_hash: &str,
    ) -> PortResult<Option<AuthSession>>;

    async fn find_active_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> PortResult<Option<AuthSession>>;

    /// Atomically swaps the token hashes. Returns `false` when the session is no
    /// longer active or its refresh hash no longer matches.
    async fn rotate_auth_session(&self, rotation: SessionRotation) -> PortResult<bool>;

    /// Marks every active session of the user inactive and returns how many.
    async fn deactivate_user_sessions(&self, user_id: Uuid) -> PortResult<u64>;

    /// Sessions that are active and not yet past `expires_at`.
    async fn list_active_auth_sessions(&self) -> PortResult<Vec<AuthSession>>;

    // --- Terminal Sessions ---
    async fn create_terminal_session(
        &self,
        user_id: Uuid,
        terminal_type: TerminalType,
    ) -> PortResult<TerminalSession>;

    async fn get_terminal_session(&self, session_id: Uuid) -> PortResult<TerminalSession>;

    async fn list_terminal_sessions(&self, user_id: Uuid) -> PortResult<Vec<TerminalSession>>;

    /// Applies the command to the session in one atomic step and returns the
    /// updated session.
    async fn record_terminal_command(
        &self,
        session_id: Uuid,
        record: CommandRecord,
    ) -> PortResult<TerminalSession>;

    async fn end_terminal_session(&self, session_id: Uuid) -> PortResult<()>;

    async fn end_user_terminal_sessions(&self, user_id: Uuid) -> PortResult<u64>;

    async fn count_active_terminal_sessions(&self) -> PortResult<i64>;

    // --- Virtual Filesystem ---
    async fn get_node_by_path(&self, path: &str) -> PortResult<Option<FilesystemNode>>;

    async fn get_node_by_id(&self, node_id: Uuid) -> PortResult<Option<FilesystemNode>>;

    /// Active nodes whose parent is exactly `parent_id` (`None` for the root).
    async fn list_child_nodes(&self, parent_id: Option<Uuid>) -> PortResult<Vec<FilesystemNode>>;

    async fn create_node(&self, node: NewFilesystemNode) -> PortResult<FilesystemNode>;

    async fn update_node(&self, node_id: Uuid, update: NodeUpdate) -> PortResult<FilesystemNode>;

    /// Soft-deletes the node and every active descendant. Returns the count.
    async fn deactivate_node_tree(&self, node_id: Uuid) -> PortResult<u64>;

    // --- Security Events ---
    async fn insert_security_event(&self, event: SecurityEvent) -> PortResult<()>;

    async fn list_security_events(&self, filter: EventFilter) -> PortResult<Vec<SecurityEvent>>;

    async fn count_security_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<(EventType, i64)>>;
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Per-key request counters. Approximate and best effort; implementations may be
/// local maps or a shared cache.
pub trait RateLimitStore: Send + Sync {
    fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision;

    /// Drops counters whose window has elapsed. Returns how many were removed.
    fn sweep(&self) -> usize;
}

/// Receives security alerts raised by administrators or by the system.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, event: &SecurityEvent) -> PortResult<()>;
}
