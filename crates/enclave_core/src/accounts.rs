//! Administrative user management. Users are never deleted; deactivation
//! cascades to every authentication and terminal session they hold.

use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ClientInfo, EventType, NewUser, Role, SecurityEvent, User, UserUpdate};
use crate::password::PasswordService;
use crate::ports::{DatabaseService, PortError};
use crate::registry::AuthError;
use crate::security::SecurityLogger;
use crate::validation;

/// Fields an administrator supplies to create an account directly.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

pub struct AccountService {
    db: Arc<dyn DatabaseService>,
    passwords: Arc<PasswordService>,
    security: SecurityLogger,
}

impl AccountService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        passwords: Arc<PasswordService>,
        security: SecurityLogger,
    ) -> Self {
        Self {
            db,
            passwords,
            security,
        }
    }

    pub async fn list(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.db.list_users().await?)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.db.get_user_by_id(user_id).await.map_err(not_found_as_user)
    }

    pub async fn create(&self, account: NewAccount) -> Result<User, AuthError> {
        validation::validate_username(&account.username).map_err(AuthError::Validation)?;
        validation::validate_email(&account.email).map_err(AuthError::Validation)?;
        validation::validate_password(&account.password).map_err(AuthError::Validation)?;

        let password_hash = self
            .passwords
            .hash(&account.password)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;
        let user = self
            .db
            .create_user(NewUser {
                username: account.username,
                email: account.email,
                password_hash,
                role: account.role,
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(field) => AuthError::Conflict(field),
                other => other.into(),
            })?;
        info!(user_id = %user.id, role = %user.role, "User created by administrator");
        Ok(user)
    }

    /// Applies the update; switching `active` off goes through [`Self::deactivate`].
    pub async fn update(
        &self,
        user_id: Uuid,
        update: UserUpdate,
        actor: Uuid,
        client: &ClientInfo,
    ) -> Result<User, AuthError> {
        if let Some(email) = &update.email {
            validation::validate_email(email).map_err(AuthError::Validation)?;
        }
        let deactivating = update.active == Some(false);
        let user = self
            .db
            .update_user(user_id, update)
            .await
            .map_err(|e| match e {
                PortError::Conflict(field) => AuthError::Conflict(field),
                other => not_found_as_user(other),
            })?;
        if deactivating {
            self.close_everything(&user, actor, client).await?;
        }
        Ok(user)
    }

    /// Soft delete: the account stays on record but can no longer log in.
    pub async fn deactivate(&self, user_id: Uuid, actor: Uuid, client: &ClientInfo) -> Result<User, AuthError> {
        self.update(
            user_id,
            UserUpdate {
                active: Some(false),
                ..UserUpdate::default()
            },
            actor,
            client,
        )
        .await
    }

    async fn close_everything(&self, user: &User, actor: Uuid, client: &ClientInfo) -> Result<(), AuthError> {
        let sessions_closed = self.db.deactivate_user_sessions(user.id).await?;
        let terminals_ended = self.db.end_user_terminal_sessions(user.id).await?;
        info!(
            user_id = %user.id,
            sessions_closed,
            terminals_ended,
            "User deactivated"
        );
        self.security
            .record(
                SecurityEvent::new(EventType::Logout, format!("User {} deactivated", user.username))
                    .for_user(user.id)
                    .from_client(client)
                    .with_metadata(json!({
                        "deactivatedBy": actor,
                        "sessionsClosed": sessions_closed,
                        "terminalsEnded": terminals_ended,
                    })),
            )
            .await;
        Ok(())
    }
}

fn not_found_as_user(e: PortError) -> AuthError {
    match e {
        PortError::NotFound(_) => AuthError::UserNotFound,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::fixture;

    #[tokio::test]
    async fn deactivation_revokes_sessions_and_terminals() {
        let fx = fixture().await;
        let client = ClientInfo::default();
        let outcome = fx.registry.login("researcher", "researcher123", &client).await.unwrap();
        let terminal = fx
            .store
            .create_terminal_session(outcome.user.id, crate::domain::TerminalType::Filesystem)
            .await
            .unwrap();

        let accounts = AccountService::new(
            fx.store.clone(),
            Arc::new(PasswordService::with_params(1024, 1, 1).unwrap()),
            fx.security.clone(),
        );
        let user = accounts.deactivate(outcome.user.id, Uuid::new_v4(), &client).await.unwrap();

        assert!(!user.active);
        assert!(fx.registry.authenticate(&outcome.tokens.access_token).await.is_err());
        assert!(!fx.store.get_terminal_session(terminal.id).await.unwrap().active);
        assert!(fx.registry.login("researcher", "researcher123", &client).await.is_err());
    }

    #[tokio::test]
    async fn admin_can_create_admins_but_not_duplicates() {
        let fx = fixture().await;
        let accounts = AccountService::new(
            fx.store.clone(),
            Arc::new(PasswordService::with_params(1024, 1, 1).unwrap()),
            fx.security.clone(),
        );
        let account = |username: &str| NewAccount {
            username: username.to_string(),
            email: format!("{username}@phoenix.local"),
            password: "long-enough".to_string(),
            role: Role::Admin,
        };

        let created = accounts.create(account("second_admin")).await.unwrap();
        assert_eq!(created.role, Role::Admin);
        assert!(matches!(
            accounts.create(account("second_admin")).await,
            Err(AuthError::Conflict(_))
        ));
        assert!(matches!(
            accounts.get(Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
