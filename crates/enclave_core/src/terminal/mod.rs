//! crates/enclave_core/src/terminal/mod.rs
//!
//! Terminal sessions and the command interpreter. A session only ever changes
//! its current directory; everything else a command does is output.

pub mod commands;
pub mod sanitize;

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    AuthContext, ClientInfo, CommandHistoryEntry, CommandRecord, EventType, FilesystemNode,
    SecurityEvent, TerminalSession, TerminalType,
};
use crate::filesystem::{FilesystemError, FilesystemService};
use crate::paths;
use crate::ports::{DatabaseService, PortError};
use crate::security::SecurityLogger;

use commands::{tokenize, Command, CommandLine, CommandOutcome, FilesystemCommand, FILESYSTEM_HELP};
use sanitize::{sanitize_command, was_altered};

const EXECUTION_FAILED: &str = "Command execution failed";

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// Missing, owned by someone else, ended or idle past the timeout.
    #[error("Terminal session not found")]
    SessionNotFound,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// What the caller sees after running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command as it was run, after sanitization.
    pub command: String,
    pub output: String,
    pub success: bool,
    pub current_directory: String,
    pub clear_screen: bool,
}

#[derive(Clone)]
pub struct TerminalService {
    db: Arc<dyn DatabaseService>,
    filesystem: FilesystemService,
    security: SecurityLogger,
    idle_timeout: Duration,
}

impl TerminalService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        filesystem: FilesystemService,
        security: SecurityLogger,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            db,
            filesystem,
            security,
            idle_timeout,
        }
    }

    pub async fn open_session(
        &self,
        user_id: Uuid,
        terminal_type: TerminalType,
    ) -> Result<TerminalSession, TerminalError> {
        let session = self.db.create_terminal_session(user_id, terminal_type).await?;
        info!(
            user_id = %user_id,
            session_id = %session.id,
            terminal_type = terminal_type.as_str(),
            "Terminal session opened"
        );
        Ok(session)
    }

    /// Active sessions of the user, most recently used first. Sessions found to
    /// be idle past the timeout are ended on the way.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<TerminalSession>, TerminalError> {
        let mut live = Vec::new();
        for session in self.db.list_terminal_sessions(user_id).await? {
            if self.is_idle(&session) {
                self.expire(&session).await?;
            } else {
                live.push(session);
            }
        }
        Ok(live)
    }

    pub async fn get_session(&self, session_id: Uuid, user_id: Uuid) -> Result<TerminalSession, TerminalError> {
        self.load_active(session_id, user_id).await
    }

    pub async fn end_session(&self, session_id: Uuid, user_id: Uuid) -> Result<(), TerminalError> {
        let session = self.load_active(session_id, user_id).await?;
        self.db.end_terminal_session(session.id).await?;
        info!(user_id = %user_id, session_id = %session_id, "Terminal session ended");
        Ok(())
    }

    /// Runs one command. Only an unusable session is an error; every failure
    /// after that point comes back as a result with `success == false`.
    pub async fn execute(
        &self,
        session_id: Uuid,
        user: &AuthContext,
        raw_command: &str,
        client: &ClientInfo,
    ) -> Result<CommandResult, TerminalError> {
        let session = self.load_active(session_id, user.user_id).await?;

        let command = sanitize_command(raw_command);
        if was_altered(raw_command, &command) {
            warn!(
                user_id = %user.user_id,
                session_id = %session.id,
                ip = %client.ip_address,
                "Command text altered by sanitization"
            );
            self.security
                .record(
                    SecurityEvent::new(EventType::Suspicious, "Command contained markup or script content")
                        .for_user(user.user_id)
                        .from_client(client)
                        .with_metadata(json!({
                            "rawCommand": raw_command,
                            "sanitizedCommand": command,
                            "sessionId": session.id,
                        })),
                )
                .await;
        }

        let outcome = match tokenize(&command) {
            Some(line) => self.dispatch(&session, user, &line).await,
            None => CommandOutcome::fail("No command entered"),
        };

        let record = CommandRecord {
            entry: CommandHistoryEntry {
                command: command.clone(),
                timestamp: Utc::now(),
                success: outcome.success,
            },
            new_directory: outcome.new_directory.clone(),
        };
        let result = match self.db.record_terminal_command(session.id, record).await {
            Ok(updated) => CommandResult {
                command: command.clone(),
                output: outcome.output,
                success: outcome.success,
                current_directory: updated.current_directory,
                clear_screen: outcome.clear_screen,
            },
            Err(e) => {
                error!(session_id = %session.id, "Failed to persist terminal command: {:?}", e);
                CommandResult {
                    command: command.clone(),
                    output: EXECUTION_FAILED.to_string(),
                    success: false,
                    current_directory: session.current_directory.clone(),
                    clear_screen: false,
                }
            }
        };

        self.security
            .record(
                SecurityEvent::new(EventType::Command, format!("Executed: {command}"))
                    .for_user(user.user_id)
                    .from_client(client)
                    .with_metadata(json!({
                        "command": command,
                        "success": result.success,
                        "terminalType": session.terminal_type.as_str(),
                        "sessionId": session.id,
                    })),
            )
            .await;

        Ok(result)
    }

    async fn load_active(&self, session_id: Uuid, user_id: Uuid) -> Result<TerminalSession, TerminalError> {
        let session = match self.db.get_terminal_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => return Err(TerminalError::SessionNotFound),
            Err(e) => return Err(e.into()),
        };
        if session.user_id != user_id || !session.active {
            return Err(TerminalError::SessionNotFound);
        }
        if self.is_idle(&session) {
            self.expire(&session).await?;
            return Err(TerminalError::SessionNotFound);
        }
        Ok(session)
    }

    fn is_idle(&self, session: &TerminalSession) -> bool {
        Utc::now() - session.last_activity > self.idle_timeout
    }

    async fn expire(&self, session: &TerminalSession) -> Result<(), TerminalError> {
        self.db.end_terminal_session(session.id).await?;
        info!(session_id = %session.id, user_id = %session.user_id, "Idle terminal session expired");
        Ok(())
    }

    async fn dispatch(&self, session: &TerminalSession, user: &AuthContext, line: &CommandLine<'_>) -> CommandOutcome {
        match Command::parse(session.terminal_type, &line.verb) {
            Some(Command::Filesystem(command)) => {
                self.run_filesystem(command, session, user, &line.args).await
            }
            Some(Command::Military(command)) => command.run(&line.args),
            Some(Command::Researcher(command)) => command.run(&line.args),
            Some(Command::Emergency(command)) => command.run(&line.args),
            None => commands::unknown_command(session.terminal_type, &line.verb),
        }
    }

    //=====================================================================================
    // Filesystem Commands
    //=====================================================================================

    async fn run_filesystem(
        &self,
        command: FilesystemCommand,
        session: &TerminalSession,
        user: &AuthContext,
        args: &[&str],
    ) -> CommandOutcome {
        let cwd = session.current_directory.as_str();
        match command {
            FilesystemCommand::List => {
                let target = args.first().map_or_else(|| cwd.to_string(), |arg| paths::resolve(cwd, arg));
                match self.filesystem.list_children(&target, user.role).await {
                    Ok(nodes) if nodes.is_empty() => CommandOutcome::ok("Directory is empty"),
                    Ok(nodes) => CommandOutcome::ok(format_listing(&nodes)),
                    Err(e) => filesystem_failure(e, format!("ls: {target}: No such directory")),
                }
            }
            FilesystemCommand::ChangeDirectory => {
                let target = args.first().map_or_else(|| "/".to_string(), |arg| paths::resolve(cwd, arg));
                if paths::is_root(&target) {
                    return CommandOutcome::moved_to(target);
                }
                match self.filesystem.find_directory(&target, user.role).await {
                    Ok(directory) => CommandOutcome::moved_to(directory.path),
                    Err(e) => filesystem_failure(
                        e,
                        format!("cd: {}: No such directory", args.first().copied().unwrap_or_default()),
                    ),
                }
            }
            FilesystemCommand::Concatenate => {
                let Some(arg) = args.first() else {
                    return CommandOutcome::fail("Usage: cat <file>");
                };
                let target = paths::resolve(cwd, arg);
                match self.filesystem.read_file(&target, user.role).await {
                    Ok(file) => CommandOutcome::ok(file.content.unwrap_or_default()),
                    Err(e) => filesystem_failure(e, format!("cat: {arg}: No such file")),
                }
            }
            FilesystemCommand::PrintWorkingDirectory => CommandOutcome::ok(cwd),
            FilesystemCommand::Help => CommandOutcome::ok(FILESYSTEM_HELP),
            FilesystemCommand::Clear => CommandOutcome::clear(),
        }
    }
}

fn format_listing(nodes: &[FilesystemNode]) -> String {
    nodes
        .iter()
        .map(|node| {
            if node.is_directory() {
                format!("[DIR]  {}/", node.name)
            } else {
                format!("[FILE] {}", node.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Missing and forbidden nodes share `not_found`; store failures get the
/// generic message.
fn filesystem_failure(error: FilesystemError, not_found: String) -> CommandOutcome {
    match error {
        FilesystemError::NotFoundOrDenied => CommandOutcome::fail(not_found),
        other => {
            error!("Filesystem command failed: {:?}", other);
            CommandOutcome::fail(EXECUTION_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessLevel, EventFilter, NodeType, Role, HISTORY_LIMIT};
    use crate::filesystem::CreateNode;
    use crate::memory::failing::FailingWrites;
    use crate::memory::InMemoryStore;
    use crate::registry::tests::SilentNotifier;

    struct Fixture {
        store: Arc<InMemoryStore>,
        terminals: TerminalService,
        security: SecurityLogger,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let filesystem = FilesystemService::new(store.clone());
        for (path, node_type, access_level) in [
            ("/readme.txt", NodeType::File, AccessLevel::Public),
            ("/research", NodeType::Directory, AccessLevel::Researcher),
            ("/research/research_notes.md", NodeType::File, AccessLevel::Researcher),
            ("/research/experiments", NodeType::Directory, AccessLevel::Researcher),
            ("/military", NodeType::Directory, AccessLevel::Military),
            ("/military/orders.txt", NodeType::File, AccessLevel::Military),
            ("/vault", NodeType::Directory, AccessLevel::Public),
        ] {
            filesystem
                .create(CreateNode {
                    path: path.to_string(),
                    node_type,
                    content: Some(format!("Research Notes at {path}")),
                    access_level,
                })
                .await
                .unwrap();
        }
        let security = SecurityLogger::new(store.clone(), Arc::new(SilentNotifier));
        let terminals = TerminalService::new(store.clone(), filesystem, security.clone(), Duration::minutes(60));
        Fixture {
            store,
            terminals,
            security,
        }
    }

    fn researcher() -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            username: "researcher".to_string(),
            role: Role::Researcher,
            session_id: Uuid::new_v4(),
        }
    }

    async fn run(fx: &Fixture, session: &TerminalSession, user: &AuthContext, command: &str) -> CommandResult {
        fx.terminals
            .execute(session.id, user, command, &ClientInfo::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn researcher_walks_the_filesystem() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        let listing = run(&fx, &session, &user, "ls").await;
        assert!(listing.success);
        assert!(listing.output.contains("research/"));
        assert!(!listing.output.contains("military"));

        let cd = run(&fx, &session, &user, "cd research").await;
        assert!(cd.success);
        assert_eq!(cd.current_directory, "/research");

        let cat = run(&fx, &session, &user, "CAT research_notes.md").await;
        assert!(cat.success);
        assert!(cat.output.contains("Research Notes"));

        let pwd = run(&fx, &session, &user, "pwd").await;
        assert_eq!(pwd.output, "/research");
    }

    #[tokio::test]
    async fn cd_up_from_top_level_and_root_lands_on_root() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        run(&fx, &session, &user, "cd /research").await;
        assert_eq!(run(&fx, &session, &user, "cd ..").await.current_directory, "/");
        let again = run(&fx, &session, &user, "cd ..").await;
        assert!(again.success);
        assert_eq!(again.current_directory, "/");

        run(&fx, &session, &user, "cd research/experiments").await;
        assert_eq!(run(&fx, &session, &user, "cd").await.current_directory, "/");
    }

    #[tokio::test]
    async fn forbidden_files_read_like_missing_ones() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        let forbidden = run(&fx, &session, &user, "cat /military/orders.txt").await;
        let missing = run(&fx, &session, &user, "cat /military/absent.txt").await;
        assert!(!forbidden.success && !missing.success);
        assert_eq!(forbidden.output, "cat: /military/orders.txt: No such file");
        assert_eq!(missing.output, "cat: /military/absent.txt: No such file");

        let cd = run(&fx, &session, &user, "cd military").await;
        assert!(!cd.success);
        assert_eq!(cd.output, "cd: military: No such directory");
        assert_eq!(cd.current_directory, "/");
    }

    #[tokio::test]
    async fn files_are_not_directories() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        assert!(!run(&fx, &session, &user, "cd readme.txt").await.success);
        let empty = run(&fx, &session, &user, "ls /vault").await;
        assert!(empty.success);
        assert_eq!(empty.output, "Directory is empty");
    }

    #[tokio::test]
    async fn history_keeps_the_latest_hundred_commands() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        for i in 0..150 {
            run(&fx, &session, &user, &format!("echo {i}")).await;
        }
        let stored = fx.terminals.get_session(session.id, user.user_id).await.unwrap();
        assert_eq!(stored.command_history.len(), HISTORY_LIMIT);
        assert_eq!(stored.command_history[0].command, "echo 50");
        assert_eq!(stored.command_history[99].command, "echo 149");
    }

    #[tokio::test]
    async fn unknown_verbs_fail_and_are_still_audited() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Military).await.unwrap();

        let result = run(&fx, &session, &user, "ls").await;
        assert!(!result.success);
        assert_eq!(result.output, "Access denied: unrecognized directive 'ls'");

        let events = fx
            .security
            .recent(EventFilter {
                event_type: Some(EventType::Command),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["success"], false);
        assert_eq!(events[0].metadata["terminalType"], "MILITARY");
    }

    #[tokio::test]
    async fn markup_is_stripped_and_flagged() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Emergency).await.unwrap();

        let result = run(&fx, &session, &user, "<status>").await;
        assert!(result.success);
        assert_eq!(result.command, "status");

        let suspicious = fx
            .security
            .recent(EventFilter {
                event_type: Some(EventType::Suspicious),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(suspicious.len(), 1);
        let stored = fx.terminals.get_session(session.id, user.user_id).await.unwrap();
        assert_eq!(stored.command_history[0].command, "status");
    }

    #[tokio::test]
    async fn persistence_failures_become_a_generic_failed_result() {
        let store = Arc::new(FailingWrites::default());
        let security = SecurityLogger::new(store.clone(), Arc::new(SilentNotifier));
        let terminals = TerminalService::new(
            store.clone(),
            FilesystemService::new(store.clone()),
            security,
            Duration::minutes(60),
        );
        let user = researcher();
        let session = terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        let result = terminals
            .execute(session.id, &user, "pwd", &ClientInfo::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Command execution failed");
        assert_eq!(result.current_directory, "/");
        assert_eq!(result.command, "pwd");
    }

    #[tokio::test]
    async fn empty_commands_fail() {
        let fx = fixture().await;
        let user = researcher();
        let session = fx.terminals.open_session(user.user_id, TerminalType::Researcher).await.unwrap();
        assert!(!run(&fx, &session, &user, "   ").await.success);
    }

    #[tokio::test]
    async fn sessions_are_private_to_their_owner() {
        let fx = fixture().await;
        let owner = researcher();
        let intruder = researcher();
        let session = fx.terminals.open_session(owner.user_id, TerminalType::Filesystem).await.unwrap();

        let result = fx
            .terminals
            .execute(session.id, &intruder, "ls", &ClientInfo::default())
            .await;
        assert!(matches!(result, Err(TerminalError::SessionNotFound)));
    }

    #[tokio::test]
    async fn ended_and_idle_sessions_are_gone() {
        let fx = fixture().await;
        let user = researcher();
        let ended = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();
        let idle = fx.terminals.open_session(user.user_id, TerminalType::Filesystem).await.unwrap();

        fx.terminals.end_session(ended.id, user.user_id).await.unwrap();
        fx.store
            .set_terminal_last_activity(idle.id, Utc::now() - Duration::minutes(61))
            .await;

        assert!(fx.terminals.list_sessions(user.user_id).await.unwrap().is_empty());
        for id in [ended.id, idle.id] {
            let result = fx.terminals.execute(id, &user, "pwd", &ClientInfo::default()).await;
            assert!(matches!(result, Err(TerminalError::SessionNotFound)));
        }
    }
}
