//! services/api/src/web/state.rs
//!
//! Defines the application's shared state, created once at startup and passed
//! to all handlers.

use crate::config::Config;
use crate::web::realtime::RealtimeHub;
use enclave_core::{
    AccountService, AlertNotifier, DatabaseService, FilesystemService, PasswordService,
    RateLimitStore, SecurityLogger, SessionRegistry, TerminalService, TokenService, TokenSettings,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseService>,
    pub registry: Arc<SessionRegistry>,
    pub accounts: Arc<AccountService>,
    pub terminals: TerminalService,
    pub filesystem: FilesystemService,
    pub security: SecurityLogger,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub realtime: RealtimeHub,
}

impl AppState {
    /// Wires the core services on top of the given adapters.
    pub fn build(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        passwords: Arc<PasswordService>,
        notifier: Arc<dyn AlertNotifier>,
        rate_limiter: Arc<dyn RateLimitStore>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(TokenSettings {
            access_secret: config.jwt_secret.clone(),
            refresh_secret: config.jwt_refresh_secret.clone(),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }));
        let security = SecurityLogger::new(db.clone(), notifier);
        let filesystem = FilesystemService::new(db.clone());
        let registry = SessionRegistry::new(db.clone(), tokens, passwords.clone(), security.clone());
        let accounts = AccountService::new(db.clone(), passwords, security.clone());
        let terminals = TerminalService::new(
            db.clone(),
            filesystem.clone(),
            security.clone(),
            config.terminal_idle_timeout,
        );

        Self {
            config,
            db,
            registry: Arc::new(registry),
            accounts: Arc::new(accounts),
            terminals,
            filesystem,
            security,
            rate_limiter,
            realtime: RealtimeHub::default(),
        }
    }
}
