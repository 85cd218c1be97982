//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enclave_core::domain::{
    AuthSession, CommandHistoryEntry, CommandRecord, EventFilter, EventType, FilesystemNode,
    NewAuthSession, NewFilesystemNode, NewUser, NodeUpdate, SecurityEvent, SessionRotation,
    TerminalSession, TerminalType, User, UserCredentials, UserUpdate,
};
use enclave_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{types::Json, FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Maps unique-index violations to a `Conflict` naming the field.
fn db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_username_key") => "username",
                Some("users_email_key") => "email",
                Some("filesystem_nodes_path_key") => "path",
                _ => "record",
            };
            return PortError::Conflict(field.to_string());
        }
    }
    PortError::Unexpected(e.to_string())
}

fn parse_column<T>(value: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt column value: {}", e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, active, last_login, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                role: parse_column(&self.role)?,
                active: self.active,
                last_login: self.last_login,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            password_hash: self.password_hash,
        })
    }
}

const AUTH_SESSION_COLUMNS: &str = "id, user_id, access_token_hash, refresh_token_hash, expires_at, \
     ip_address, user_agent, active, created_at, updated_at";

#[derive(FromRow)]
struct AuthSessionRecord {
    id: Uuid,
    user_id: Uuid,
    access_token_hash: String,
    refresh_token_hash: String,
    expires_at: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl AuthSessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            user_id: self.user_id,
            access_token_hash: self.access_token_hash,
            refresh_token_hash: self.refresh_token_hash,
            expires_at: self.expires_at,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const TERMINAL_COLUMNS: &str = "id, user_id, terminal_type, current_directory, command_history, \
     started_at, last_activity, active";

#[derive(FromRow)]
struct TerminalSessionRecord {
    id: Uuid,
    user_id: Uuid,
    terminal_type: String,
    current_directory: String,
    command_history: Json<Vec<CommandHistoryEntry>>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    active: bool,
}
impl TerminalSessionRecord {
    fn to_domain(self) -> PortResult<TerminalSession> {
        Ok(TerminalSession {
            id: self.id,
            user_id: self.user_id,
            terminal_type: parse_column(&self.terminal_type)?,
            current_directory: self.current_directory,
            command_history: self.command_history.0,
            started_at: self.started_at,
            last_activity: self.last_activity,
            active: self.active,
        })
    }
}

const NODE_COLUMNS: &str =
    "id, name, path, node_type, content, parent_id, access_level, active, created_at, updated_at";

#[derive(FromRow)]
struct NodeRecord {
    id: Uuid,
    name: String,
    path: String,
    node_type: String,
    content: Option<String>,
    parent_id: Option<Uuid>,
    access_level: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl NodeRecord {
    fn to_domain(self) -> PortResult<FilesystemNode> {
        Ok(FilesystemNode {
            id: self.id,
            name: self.name,
            path: self.path,
            node_type: parse_column(&self.node_type)?,
            content: self.content,
            parent_id: self.parent_id,
            access_level: parse_column(&self.access_level)?,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const EVENT_COLUMNS: &str =
    "id, user_id, event_type, description, ip_address, user_agent, metadata, created_at";

#[derive(FromRow)]
struct SecurityEventRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    event_type: String,
    description: String,
    ip_address: String,
    user_agent: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}
impl SecurityEventRecord {
    fn to_domain(self) -> PortResult<SecurityEvent> {
        Ok(SecurityEvent {
            id: self.id,
            user_id: self.user_id,
            event_type: parse_column(&self.event_type)?,
            description: self.description,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Credential Store ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain()?.user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        Ok(self.get_credentials_by_id(user_id).await?.user)
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))?
            .to_domain()
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY username ASC");
        let records = sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records
            .into_iter()
            .map(|r| r.to_domain().map(|c| c.user))
            .collect()
    }

    async fn count_users(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET \
                 email = COALESCE($2, email), \
                 role = COALESCE($3, role), \
                 active = COALESCE($4, active), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(update.email)
            .bind(update.role.map(|r| r.as_str()))
            .bind(update.active)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
            .map(|c| c.user)
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    // --- Session Registry ---

    async fn create_auth_session(&self, session: NewAuthSession) -> PortResult<AuthSession> {
        let sql = format!(
            "INSERT INTO auth_sessions \
                 (id, user_id, access_token_hash, refresh_token_hash, expires_at, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {AUTH_SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, AuthSessionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(&session.access_token_hash)
            .bind(&session.refresh_token_hash)
            .bind(session.expires_at)
            .bind(&session.client.ip_address)
            .bind(&session.client.user_agent)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn find_active_session_by_access_hash(
        &self,
        access_token_hash: &str,
    ) -> PortResult<Option<AuthSession>> {
        let sql = format!(
            "SELECT {AUTH_SESSION_COLUMNS} FROM auth_sessions WHERE access_token_hash = $1 AND active"
        );
        let record = sqlx::query_as::<_, AuthSessionRecord>(&sql)
            .bind(access_token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(AuthSessionRecord::to_domain))
    }

    async fn find_active_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> PortResult<Option<AuthSession>> {
        let sql = format!(
            "SELECT {AUTH_SESSION_COLUMNS} FROM auth_sessions WHERE refresh_token_hash = $1 AND active"
        );
        let record = sqlx::query_as::<_, AuthSessionRecord>(&sql)
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(AuthSessionRecord::to_domain))
    }

    async fn rotate_auth_session(&self, rotation: SessionRotation) -> PortResult<bool> {
        // Compare-and-swap on the refresh hash: a concurrent rotation wins at most once.
        let result = sqlx::query(
            "UPDATE auth_sessions SET \
                 access_token_hash = $3, refresh_token_hash = $4, expires_at = $5, \
                 ip_address = $6, user_agent = $7, updated_at = NOW() \
             WHERE id = $1 AND active AND refresh_token_hash = $2",
        )
        .bind(rotation.session_id)
        .bind(&rotation.expected_refresh_hash)
        .bind(&rotation.access_token_hash)
        .bind(&rotation.refresh_token_hash)
        .bind(rotation.expires_at)
        .bind(&rotation.client.ip_address)
        .bind(&rotation.client.user_agent)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET active = FALSE, updated_at = NOW() WHERE user_id = $1 AND active",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn list_active_auth_sessions(&self) -> PortResult<Vec<AuthSession>> {
        let sql = format!(
            "SELECT {AUTH_SESSION_COLUMNS} FROM auth_sessions WHERE active AND expires_at > NOW() ORDER BY updated_at DESC"
        );
        let records = sqlx::query_as::<_, AuthSessionRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(AuthSessionRecord::to_domain).collect())
    }

    // --- Terminal Sessions ---

    async fn create_terminal_session(
        &self,
        user_id: Uuid,
        terminal_type: TerminalType,
    ) -> PortResult<TerminalSession> {
        let sql = format!(
            "INSERT INTO terminal_sessions (id, user_id, terminal_type) \
             VALUES ($1, $2, $3) RETURNING {TERMINAL_COLUMNS}"
        );
        sqlx::query_as::<_, TerminalSessionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(terminal_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?
            .to_domain()
    }

    async fn get_terminal_session(&self, session_id: Uuid) -> PortResult<TerminalSession> {
        let sql = format!("SELECT {TERMINAL_COLUMNS} FROM terminal_sessions WHERE id = $1");
        sqlx::query_as::<_, TerminalSessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Terminal session {} not found", session_id)))?
            .to_domain()
    }

    async fn list_terminal_sessions(&self, user_id: Uuid) -> PortResult<Vec<TerminalSession>> {
        let sql = format!(
            "SELECT {TERMINAL_COLUMNS} FROM terminal_sessions \
             WHERE user_id = $1 AND active ORDER BY last_activity DESC"
        );
        let records = sqlx::query_as::<_, TerminalSessionRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records.into_iter().map(TerminalSessionRecord::to_domain).collect()
    }

    async fn record_terminal_command(
        &self,
        session_id: Uuid,
        record: CommandRecord,
    ) -> PortResult<TerminalSession> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!("SELECT {TERMINAL_COLUMNS} FROM terminal_sessions WHERE id = $1 FOR UPDATE");
        let mut session = sqlx::query_as::<_, TerminalSessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Terminal session {} not found", session_id)))?
            .to_domain()?;
        session.apply_command(record);

        sqlx::query(
            "UPDATE terminal_sessions SET \
                 command_history = $2, current_directory = $3, last_activity = $4 \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(Json(&session.command_history))
        .bind(&session.current_directory)
        .bind(session.last_activity)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(session)
    }

    async fn end_terminal_session(&self, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE terminal_sessions SET active = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Terminal session {} not found", session_id)));
        }
        Ok(())
    }

    async fn end_user_terminal_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("UPDATE terminal_sessions SET active = FALSE WHERE user_id = $1 AND active")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn count_active_terminal_sessions(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM terminal_sessions WHERE active")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }

    // --- Virtual Filesystem ---

    async fn get_node_by_path(&self, path: &str) -> PortResult<Option<FilesystemNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM filesystem_nodes WHERE path = $1 AND active");
        sqlx::query_as::<_, NodeRecord>(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(NodeRecord::to_domain)
            .transpose()
    }

    async fn get_node_by_id(&self, node_id: Uuid) -> PortResult<Option<FilesystemNode>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM filesystem_nodes WHERE id = $1 AND active");
        sqlx::query_as::<_, NodeRecord>(&sql)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(NodeRecord::to_domain)
            .transpose()
    }

    async fn list_child_nodes(&self, parent_id: Option<Uuid>) -> PortResult<Vec<FilesystemNode>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM filesystem_nodes \
             WHERE parent_id IS NOT DISTINCT FROM $1 AND active"
        );
        let records = sqlx::query_as::<_, NodeRecord>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records.into_iter().map(NodeRecord::to_domain).collect()
    }

    async fn create_node(&self, node: NewFilesystemNode) -> PortResult<FilesystemNode> {
        let sql = format!(
            "INSERT INTO filesystem_nodes (id, name, path, node_type, content, parent_id, access_level) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {NODE_COLUMNS}"
        );
        sqlx::query_as::<_, NodeRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&node.name)
            .bind(&node.path)
            .bind(node.node_type.as_str())
            .bind(&node.content)
            .bind(node.parent_id)
            .bind(node.access_level.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?
            .to_domain()
    }

    async fn update_node(&self, node_id: Uuid, update: NodeUpdate) -> PortResult<FilesystemNode> {
        let sql = format!(
            "UPDATE filesystem_nodes SET \
                 content = COALESCE($2, content), \
                 access_level = COALESCE($3, access_level), \
                 updated_at = NOW() \
             WHERE id = $1 AND active RETURNING {NODE_COLUMNS}"
        );
        sqlx::query_as::<_, NodeRecord>(&sql)
            .bind(node_id)
            .bind(update.content)
            .bind(update.access_level.map(|a| a.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Node {} not found", node_id)))?
            .to_domain()
    }

    async fn deactivate_node_tree(&self, node_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query(
            "WITH RECURSIVE tree AS ( \
                 SELECT id FROM filesystem_nodes WHERE id = $1 AND active \
                 UNION ALL \
                 SELECT child.id FROM filesystem_nodes child \
                 JOIN tree ON child.parent_id = tree.id \
                 WHERE child.active \
             ) \
             UPDATE filesystem_nodes SET active = FALSE, updated_at = NOW() \
             WHERE id IN (SELECT id FROM tree)",
        )
        .bind(node_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    // --- Security Events ---

    async fn insert_security_event(&self, event: SecurityEvent) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO security_events \
                 (id, user_id, event_type, description, ip_address, user_agent, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.description)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_security_events(&self, filter: EventFilter) -> PortResult<Vec<SecurityEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM security_events \
             WHERE ($1::TEXT IS NULL OR event_type = $1) \
               AND ($2::UUID IS NULL OR user_id = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let records = sqlx::query_as::<_, SecurityEventRecord>(&sql)
            .bind(filter.event_type.map(|t| t.as_str()))
            .bind(filter.user_id)
            .bind(filter.limit.max(0))
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        records.into_iter().map(SecurityEventRecord::to_domain).collect()
    }

    async fn count_security_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<(EventType, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT event_type, COUNT(*) FROM security_events WHERE created_at >= $1 GROUP BY event_type",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter()
            .map(|(event_type, count)| Ok((parse_column(&event_type)?, count)))
            .collect()
    }
}
