//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its
//! translation into HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use enclave_core::{
    filesystem::FilesystemError, ports::PortError, registry::AuthError, terminal::TerminalError,
    tokens::TokenError,
};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or rejected input.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired credentials.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated, but the role does not allow the action.
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// A unique field is already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Full text of a suppressed internal error, attached to the response so the
/// development-mode middleware can surface it.
#[derive(Clone, Debug)]
pub struct InternalErrorDetail(pub String);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Config(_)
            | ApiError::Port(_)
            | ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthenticated() -> Self {
        ApiError::Authentication("Authentication required".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = status
            .is_server_error()
            .then(|| {
                error!("Request failed: {:?}", self);
                InternalErrorDetail(self.to_string())
            });
        let message = match &detail {
            Some(_) => INTERNAL_MESSAGE.to_string(),
            None => self.to_string(),
        };

        let mut response = (status, Json(json!({ "success": false, "error": message }))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

//=========================================================================================
// Conversions from Core Errors
//=========================================================================================

impl From<PortError> for ApiError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => ApiError::NotFound(what),
            PortError::Conflict(field) => ApiError::Conflict(format!("The {field} is already in use")),
            other => ApiError::Port(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::InvalidRefreshToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::SessionRevoked => ApiError::Authentication(e.to_string()),
            AuthError::CurrentPasswordIncorrect | AuthError::Validation(_) => {
                ApiError::Validation(e.to_string())
            }
            AuthError::Conflict(_) => ApiError::Conflict(e.to_string()),
            AuthError::ForbiddenRole => ApiError::Authorization(e.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(e.to_string()),
            AuthError::Crypto(message) => ApiError::Internal(message),
            AuthError::Port(port) => port.into(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        AuthError::from(e).into()
    }
}

impl From<TerminalError> for ApiError {
    fn from(e: TerminalError) -> Self {
        match e {
            TerminalError::SessionNotFound => ApiError::NotFound(e.to_string()),
            TerminalError::Port(port) => port.into(),
        }
    }
}

impl From<FilesystemError> for ApiError {
    fn from(e: FilesystemError) -> Self {
        match e {
            FilesystemError::NotFoundOrDenied => ApiError::NotFound(e.to_string()),
            FilesystemError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            FilesystemError::ParentNotFound(_)
            | FilesystemError::InvalidPath(_)
            | FilesystemError::NotAFile => ApiError::Validation(e.to_string()),
            FilesystemError::Port(port) => port.into(),
        }
    }
}
