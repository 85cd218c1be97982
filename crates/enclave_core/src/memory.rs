//! crates/enclave_core/src/memory.rs
//!
//! An in-memory implementation of the `DatabaseService` port. Backs the demo
//! mode (no `DATABASE_URL`) and the test suites. Every operation takes the
//! single table lock, which makes each port call atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AuthSession, CommandRecord, EventFilter, EventType, FilesystemNode, NewAuthSession,
    NewFilesystemNode, NewUser, NodeUpdate, SecurityEvent, SessionRotation, TerminalSession,
    TerminalType, User, UserCredentials, UserUpdate,
};
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    auth_sessions: HashMap<Uuid, AuthSession>,
    terminal_sessions: HashMap<Uuid, TerminalSession>,
    nodes: HashMap<Uuid, FilesystemNode>,
    events: Vec<SecurityEvent>,
}

impl Tables {
    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut UserCredentials> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|c| c.user.email.eq_ignore_ascii_case(email) && Some(c.user.id) != except)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the last-activity timestamp of a terminal session.
    pub async fn set_terminal_last_activity(&self, session_id: Uuid, at: DateTime<Utc>) {
        if let Some(session) = self.tables.lock().await.terminal_sessions.get_mut(&session_id) {
            session.last_activity = at;
        }
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|c| c.user.username.eq_ignore_ascii_case(&new_user.username))
        {
            return Err(PortError::Conflict("username".to_string()));
        }
        if tables.email_taken(&new_user.email, None) {
            return Err(PortError::Conflict("email".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        Ok(self.get_credentials_by_id(user_id).await?.user)
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        self.tables
            .lock()
            .await
            .users
            .values()
            .find(|c| c.user.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        self.tables
            .lock()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().map(|c| c.user.clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn count_users(&self) -> PortResult<i64> {
        Ok(self.tables.lock().await.users.len() as i64)
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(email) = &update.email {
            if tables.email_taken(email, Some(user_id)) {
                return Err(PortError::Conflict("email".to_string()));
            }
        }
        let credentials = tables.user_mut(user_id)?;
        if let Some(email) = update.email {
            credentials.user.email = email;
        }
        if let Some(role) = update.role {
            credentials.user.role = role;
        }
        if let Some(active) = update.active {
            credentials.user.active = active;
        }
        credentials.user.updated_at = Utc::now();
        Ok(credentials.user.clone())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let credentials = tables.user_mut(user_id)?;
        credentials.password_hash = password_hash.to_string();
        credentials.user.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.user_mut(user_id)?.user.last_login = Some(at);
        Ok(())
    }

    async fn create_auth_session(&self, session: NewAuthSession) -> PortResult<AuthSession> {
        let now = Utc::now();
        let record = AuthSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            access_token_hash: session.access_token_hash,
            refresh_token_hash: session.refresh_token_hash,
            expires_at: session.expires_at,
            ip_address: session.client.ip_address,
            user_agent: session.client.user_agent,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .auth_sessions
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_active_session_by_access_hash(
        &self,
        access_token_hash: &str,
    ) -> PortResult<Option<AuthSession>> {
        Ok(self
            .tables
            .lock()
            .await
            .auth_sessions
            .values()
            .find(|s| s.active && s.access_token_hash == access_token_hash)
            .cloned())
    }

    async fn find_active_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> PortResult<Option<AuthSession>> {
        Ok(self
            .tables
            .lock()
            .await
            .auth_sessions
            .values()
            .find(|s| s.active && s.refresh_token_hash == refresh_token_hash)
            .cloned())
    }

    async fn rotate_auth_session(&self, rotation: SessionRotation) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.auth_sessions.get_mut(&rotation.session_id) {
            Some(session)
                if session.active && session.refresh_token_hash == rotation.expected_refresh_hash =>
            {
                session.access_token_hash = rotation.access_token_hash;
                session.refresh_token_hash = rotation.refresh_token_hash;
                session.expires_at = rotation.expires_at;
                session.ip_address = rotation.client.ip_address;
                session.user_agent = rotation.client.user_agent;
                session.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut closed = 0;
        for session in tables
            .auth_sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.active)
        {
            session.active = false;
            session.updated_at = now;
            closed += 1;
        }
        Ok(closed)
    }

    async fn list_active_auth_sessions(&self) -> PortResult<Vec<AuthSession>> {
        let tables = self.tables.lock().await;
        let now = Utc::now();
        let mut sessions: Vec<AuthSession> = tables
            .auth_sessions
            .values()
            .filter(|s| s.active && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn create_terminal_session(
        &self,
        user_id: Uuid,
        terminal_type: TerminalType,
    ) -> PortResult<TerminalSession> {
        let session = TerminalSession::new(user_id, terminal_type, Utc::now());
        self.tables
            .lock()
            .await
            .terminal_sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_terminal_session(&self, session_id: Uuid) -> PortResult<TerminalSession> {
        self.tables
            .lock()
            .await
            .terminal_sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Terminal session {} not found", session_id)))
    }

    async fn list_terminal_sessions(&self, user_id: Uuid) -> PortResult<Vec<TerminalSession>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<TerminalSession> = tables
            .terminal_sessions
            .values()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn record_terminal_command(
        &self,
        session_id: Uuid,
        record: CommandRecord,
    ) -> PortResult<TerminalSession> {
        let mut tables = self.tables.lock().await;
        let session = tables
            .terminal_sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Terminal session {} not found", session_id)))?;
        session.apply_command(record);
        Ok(session.clone())
    }

    async fn end_terminal_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let session = tables
            .terminal_sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Terminal session {} not found", session_id)))?;
        session.active = false;
        Ok(())
    }

    async fn end_user_terminal_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut ended = 0;
        for session in tables
            .terminal_sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.active)
        {
            session.active = false;
            ended += 1;
        }
        Ok(ended)
    }

    async fn count_active_terminal_sessions(&self) -> PortResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.terminal_sessions.values().filter(|s| s.active).count() as i64)
    }

    async fn get_node_by_path(&self, path: &str) -> PortResult<Option<FilesystemNode>> {
        Ok(self
            .tables
            .lock()
            .await
            .nodes
            .values()
            .find(|n| n.active && n.path == path)
            .cloned())
    }

    async fn get_node_by_id(&self, node_id: Uuid) -> PortResult<Option<FilesystemNode>> {
        Ok(self
            .tables
            .lock()
            .await
            .nodes
            .get(&node_id)
            .filter(|n| n.active)
            .cloned())
    }

    async fn list_child_nodes(&self, parent_id: Option<Uuid>) -> PortResult<Vec<FilesystemNode>> {
        Ok(self
            .tables
            .lock()
            .await
            .nodes
            .values()
            .filter(|n| n.active && n.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn create_node(&self, node: NewFilesystemNode) -> PortResult<FilesystemNode> {
        let mut tables = self.tables.lock().await;
        if tables.nodes.values().any(|n| n.active && n.path == node.path) {
            return Err(PortError::Conflict("path".to_string()));
        }
        let now = Utc::now();
        let record = FilesystemNode {
            id: Uuid::new_v4(),
            name: node.name,
            path: node.path,
            node_type: node.node_type,
            content: node.content,
            parent_id: node.parent_id,
            access_level: node.access_level,
            active: true,
            created_at: now,
            updated_at: now,
        };
        tables.nodes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_node(&self, node_id: Uuid, update: NodeUpdate) -> PortResult<FilesystemNode> {
        let mut tables = self.tables.lock().await;
        let node = tables
            .nodes
            .get_mut(&node_id)
            .filter(|n| n.active)
            .ok_or_else(|| PortError::NotFound(format!("Node {} not found", node_id)))?;
        if let Some(content) = update.content {
            node.content = Some(content);
        }
        if let Some(access_level) = update.access_level {
            node.access_level = access_level;
        }
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    async fn deactivate_node_tree(&self, node_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        if !tables.nodes.get(&node_id).is_some_and(|n| n.active) {
            return Ok(0);
        }

        let mut tree: HashSet<Uuid> = HashSet::from([node_id]);
        let mut frontier = vec![node_id];
        while let Some(parent) = frontier.pop() {
            for child in tables
                .nodes
                .values()
                .filter(|n| n.active && n.parent_id == Some(parent))
            {
                if tree.insert(child.id) {
                    frontier.push(child.id);
                }
            }
        }

        let now = Utc::now();
        for id in &tree {
            if let Some(node) = tables.nodes.get_mut(id) {
                node.active = false;
                node.updated_at = now;
            }
        }
        Ok(tree.len() as u64)
    }

    async fn insert_security_event(&self, event: SecurityEvent) -> PortResult<()> {
        self.tables.lock().await.events.push(event);
        Ok(())
    }

    async fn list_security_events(&self, filter: EventFilter) -> PortResult<Vec<SecurityEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| filter.event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| filter.user_id.map_or(true, |u| e.user_id == Some(u)))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_security_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<(EventType, i64)>> {
        let tables = self.tables.lock().await;
        let mut counts: HashMap<EventType, i64> = HashMap::new();
        for event in tables.events.iter().filter(|e| e.created_at >= since) {
            *counts.entry(event.event_type).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}


/// A store whose audit log and command history writes always fail.
#[cfg(test)]
pub(crate) mod failing {
    use super::*;

    #[derive(Default)]
    pub(crate) struct FailingWrites {
        pub inner: InMemoryStore,
    }

    fn offline<T>() -> PortResult<T> {
        Err(PortError::Unexpected("store offline".to_string()))
    }

    #[async_trait]
    impl DatabaseService for FailingWrites {
        async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
            self.inner.create_user(new_user).await
        }

        async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
            self.inner.get_user_by_id(user_id).await
        }

        async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials> {
            self.inner.get_credentials_by_username(username).await
        }

        async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
            self.inner.get_credentials_by_id(user_id).await
        }

        async fn list_users(&self) -> PortResult<Vec<User>> {
            self.inner.list_users().await
        }

        async fn count_users(&self) -> PortResult<i64> {
            self.inner.count_users().await
        }

        async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
            self.inner.update_user(user_id, update).await
        }

        async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
            self.inner.update_password_hash(user_id, password_hash).await
        }

        async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
            self.inner.touch_last_login(user_id, at).await
        }

        async fn create_auth_session(&self, session: NewAuthSession) -> PortResult<AuthSession> {
            self.inner.create_auth_session(session).await
        }

        async fn find_active_session_by_access_hash(
            &self,
            access_token_hash: &str,
        ) -> PortResult<Option<AuthSession>> {
            self.inner.find_active_session_by_access_hash(access_token_hash).await
        }

        async fn find_active_session_by_refresh_hash(
            &self,
            refresh_token_hash: &str,
        ) -> PortResult<Option<AuthSession>> {
            self.inner.find_active_session_by_refresh_hash(refresh_token_hash).await
        }

        async fn rotate_auth_session(&self, rotation: SessionRotation) -> PortResult<bool> {
            self.inner.rotate_auth_session(rotation).await
        }

        async fn deactivate_user_sessions(&self, user_id: Uuid) -> PortResult<u64> {
            self.inner.deactivate_user_sessions(user_id).await
        }

        async fn list_active_auth_sessions(&self) -> PortResult<Vec<AuthSession>> {
            self.inner.list_active_auth_sessions().await
        }

        async fn create_terminal_session(
            &self,
            user_id: Uuid,
            terminal_type: TerminalType,
        ) -> PortResult<TerminalSession> {
            self.inner.create_terminal_session(user_id, terminal_type).await
        }

        async fn get_terminal_session(&self, session_id: Uuid) -> PortResult<TerminalSession> {
            self.inner.get_terminal_session(session_id).await
        }

        async fn list_terminal_sessions(&self, user_id: Uuid) -> PortResult<Vec<TerminalSession>> {
            self.inner.list_terminal_sessions(user_id).await
        }

        async fn record_terminal_command(
            &self,
            _session_id: Uuid,
            _record: CommandRecord,
        ) -> PortResult<TerminalSession> {
            offline()
        }

        async fn end_terminal_session(&self, session_id: Uuid) -> PortResult<()> {
            self.inner.end_terminal_session(session_id).await
        }

        async fn end_user_terminal_sessions(&self, user_id: Uuid) -> PortResult<u64> {
            self.inner.end_user_terminal_sessions(user_id).await
        }

        async fn count_active_terminal_sessions(&self) -> PortResult<i64> {
            self.inner.count_active_terminal_sessions().await
        }

        async fn get_node_by_path(&self, path: &str) -> PortResult<Option<FilesystemNode>> {
            self.inner.get_node_by_path(path).await
        }

        async fn get_node_by_id(&self, node_id: Uuid) -> PortResult<Option<FilesystemNode>> {
            self.inner.get_node_by_id(node_id).await
        }

        async fn list_child_nodes(&self, parent_id: Option<Uuid>) -> PortResult<Vec<FilesystemNode>> {
            self.inner.list_child_nodes(parent_id).await
        }

        async fn create_node(&self, node: NewFilesystemNode) -> PortResult<FilesystemNode> {
            self.inner.create_node(node).await
        }

        async fn update_node(&self, node_id: Uuid, update: NodeUpdate) -> PortResult<FilesystemNode> {
            self.inner.update_node(node_id, update).await
        }

        async fn deactivate_node_tree(&self, node_id: Uuid) -> PortResult<u64> {
            self.inner.deactivate_node_tree(node_id).await
        }

        async fn insert_security_event(&self, _event: SecurityEvent) -> PortResult<()> {
            offline()
        }

        async fn list_security_events(&self, filter: EventFilter) -> PortResult<Vec<SecurityEvent>> {
            self.inner.list_security_events(filter).await
        }

        async fn count_security_events_since(
            &self,
            since: DateTime<Utc>,
        ) -> PortResult<Vec<(EventType, i64)>> {
            self.inner.count_security_events_since(since).await
        }
    }
}
