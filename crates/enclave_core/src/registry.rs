//! crates/enclave_core/src/registry.rs
//!
//! The authentication session lifecycle: login, refresh with rotation, logout,
//! password changes and per-request authentication of access tokens.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    AuthContext, ClientInfo, EventType, NewAuthSession, NewUser, Role, SecurityEvent,
    SessionRotation, User,
};
use crate::password::PasswordService;
use crate::ports::{DatabaseService, PortError};
use crate::security::SecurityLogger;
use crate::tokens::{fingerprint, TokenError, TokenPair, TokenService};
use crate::validation;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Account is deactivated")]
    AccountDeactivated,
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("Current password is incorrect")]
    CurrentPasswordIncorrect,
    #[error("Access token expired")]
    TokenExpired,
    #[error("Invalid access token")]
    TokenInvalid,
    #[error("Session is no longer active")]
    SessionRevoked,
    #[error("{0}")]
    Validation(String),
    #[error("The {0} is already registered")]
    Conflict(String),
    #[error("Self-registration as ADMIN is not permitted")]
    ForbiddenRole,
    #[error("User not found")]
    UserNotFound,
    #[error("Credential processing failed: {0}")]
    Crypto(String),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
            TokenError::Signing(message) => AuthError::Crypto(message),
        }
    }
}

/// Fields submitted at self-registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

/// A successful login: the user as now stored plus the freshly issued pair.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
    pub session_id: Uuid,
}

pub struct SessionRegistry {
    db: Arc<dyn DatabaseService>,
    tokens: Arc<TokenService>,
    passwords: Arc<PasswordService>,
    security: SecurityLogger,
}

impl SessionRegistry {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        tokens: Arc<TokenService>,
        passwords: Arc<PasswordService>,
        security: SecurityLogger,
    ) -> Self {
        Self {
            db,
            tokens,
            passwords,
            security,
        }
    }

    pub async fn register(
        &self,
        registration: Registration,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        validation::validate_username(&registration.username).map_err(AuthError::Validation)?;
        validation::validate_email(&registration.email).map_err(AuthError::Validation)?;
        validation::validate_password(&registration.password).map_err(AuthError::Validation)?;

        let role = registration.role.unwrap_or(Role::Researcher);
        if role.is_admin() {
            return Err(AuthError::ForbiddenRole);
        }

        let password_hash = self
            .passwords
            .hash(&registration.password)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;
        let user = self
            .db
            .create_user(NewUser {
                username: registration.username,
                email: registration.email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(field) => AuthError::Conflict(field),
                other => other.into(),
            })?;
        info!(user_id = %user.id, username = %user.username, "User registered");

        self.open_session(user, client).await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let credentials = match self.db.get_credentials_by_username(username).await {
            Ok(credentials) => credentials,
            Err(PortError::NotFound(_)) => {
                self.passwords.verify_dummy(password);
                self.record_denied(None, username, "unknown user", client).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.passwords.verify(password, &credentials.password_hash) {
            self.record_denied(Some(credentials.user.id), username, "wrong password", client)
                .await;
            return Err(AuthError::InvalidCredentials);
        }
        if !credentials.user.active {
            self.record_denied(Some(credentials.user.id), username, "account deactivated", client)
                .await;
            return Err(AuthError::AccountDeactivated);
        }

        self.open_session(credentials.user, client).await
    }

    async fn open_session(&self, mut user: User, client: &ClientInfo) -> Result<LoginOutcome, AuthError> {
        let now = Utc::now();
        self.db.touch_last_login(user.id, now).await?;
        user.last_login = Some(now);

        let tokens = self.tokens.issue_pair(&user)?;
        let session = self
            .db
            .create_auth_session(NewAuthSession {
                user_id: user.id,
                access_token_hash: fingerprint(&tokens.access_token),
                refresh_token_hash: fingerprint(&tokens.refresh_token),
                expires_at: tokens.refresh_expires_at,
                client: client.clone(),
            })
            .await?;

        info!(user_id = %user.id, session_id = %session.id, ip = %client.ip_address, "User logged in");
        self.security
            .record(
                SecurityEvent::new(EventType::Login, format!("User {} logged in", user.username))
                    .for_user(user.id)
                    .from_client(client)
                    .with_metadata(json!({ "sessionId": session.id, "role": user.role })),
            )
            .await;

        Ok(LoginOutcome {
            user,
            tokens,
            session_id: session.id,
        })
    }

    /// Exchanges a refresh token for a new pair, rotating the stored hashes in
    /// place. A verifiable token that matches no active session has either been
    /// used already or revoked, and is reported as suspicious.
    pub async fn refresh(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        let presented_hash = fingerprint(refresh_token);

        let session = match self.db.find_active_session_by_refresh_hash(&presented_hash).await? {
            Some(session) if session.user_id == claims.sub => session,
            _ => {
                warn!(user_id = %claims.sub, ip = %client.ip_address, "Refresh token reuse or revocation detected");
                self.security
                    .record(
                        SecurityEvent::new(
                            EventType::Suspicious,
                            "Refresh token does not match any active session",
                        )
                        .for_user(claims.sub)
                        .from_client(client)
                        .with_metadata(json!({ "reason": "refresh_token_reuse" })),
                    )
                    .await;
                return Err(AuthError::InvalidRefreshToken);
            }
        };
        if session.expires_at <= Utc::now() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = match self.db.get_user_by_id(claims.sub).await {
            Ok(user) if user.active => user,
            Ok(_) | Err(PortError::NotFound(_)) => return Err(AuthError::InvalidRefreshToken),
            Err(e) => return Err(e.into()),
        };

        let tokens = self.tokens.issue_pair(&user)?;
        let rotated = self
            .db
            .rotate_auth_session(SessionRotation {
                session_id: session.id,
                expected_refresh_hash: presented_hash,
                access_token_hash: fingerprint(&tokens.access_token),
                refresh_token_hash: fingerprint(&tokens.refresh_token),
                expires_at: tokens.refresh_expires_at,
                client: client.clone(),
            })
            .await?;
        if !rotated {
            // Another request rotated this session between our read and write.
            warn!(session_id = %session.id, "Concurrent refresh lost the rotation race");
            return Err(AuthError::InvalidRefreshToken);
        }

        Ok(tokens)
    }

    /// Resolves an access token to the principal it belongs to. The token must
    /// verify and still be the current access token of an active session.
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthContext, AuthError> {
        let claims = self.tokens.verify_access(access_token)?;
        let session = self
            .db
            .find_active_session_by_access_hash(&fingerprint(access_token))
            .await?
            .filter(|s| s.user_id == claims.sub && s.expires_at > Utc::now())
            .ok_or(AuthError::SessionRevoked)?;

        let user = match self.db.get_user_by_id(claims.sub).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => return Err(AuthError::SessionRevoked),
            Err(e) => return Err(e.into()),
        };
        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }

        Ok(AuthContext {
            user_id: user.id,
            username: user.username,
            role: user.role,
            session_id: session.id,
        })
    }

    /// Ends every active session of the user. Returns how many were closed.
    pub async fn logout(&self, user_id: Uuid, client: &ClientInfo) -> Result<u64, AuthError> {
        let closed = self.db.deactivate_user_sessions(user_id).await?;
        info!(user_id = %user_id, sessions_closed = closed, "User logged out");
        self.security
            .record(
                SecurityEvent::new(EventType::Logout, "User logged out")
                    .for_user(user_id)
                    .from_client(client)
                    .with_metadata(json!({ "sessionsClosed": closed })),
            )
            .await;
        Ok(closed)
    }

    /// Replaces the password and invalidates every active session of the user.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<u64, AuthError> {
        validation::validate_password(new_password).map_err(AuthError::Validation)?;

        let credentials = match self.db.get_credentials_by_id(user_id).await {
            Ok(credentials) => credentials,
            Err(PortError::NotFound(_)) => return Err(AuthError::UserNotFound),
            Err(e) => return Err(e.into()),
        };
        if !self.passwords.verify(current_password, &credentials.password_hash) {
            self.record_denied(
                Some(user_id),
                &credentials.user.username,
                "password change with wrong current password",
                client,
            )
            .await;
            return Err(AuthError::CurrentPasswordIncorrect);
        }

        let password_hash = self
            .passwords
            .hash(new_password)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;
        self.db.update_password_hash(user_id, &password_hash).await?;
        let closed = self.db.deactivate_user_sessions(user_id).await?;

        info!(user_id = %user_id, sessions_closed = closed, "Password changed");
        self.security
            .record(
                SecurityEvent::new(EventType::Logout, "Password changed; all sessions invalidated")
                    .for_user(user_id)
                    .from_client(client)
                    .with_metadata(json!({ "sessionsClosed": closed, "reason": "password_change" })),
            )
            .await;
        Ok(closed)
    }

    async fn record_denied(&self, user_id: Option<Uuid>, username: &str, reason: &str, client: &ClientInfo) {
        warn!(username = %username, ip = %client.ip_address, reason, "Authentication denied");
        let mut event = SecurityEvent::new(
            EventType::AccessDenied,
            format!("Failed authentication for {}", username),
        )
        .from_client(client)
        .with_metadata(json!({ "username": username, "reason": reason }));
        event.user_id = user_id;
        self.security.record(event).await;
    }
}
