//! services/api/src/web/middleware.rs
//!
//! Authentication, rate limiting and error-detail middleware.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use enclave_core::ports::RateDecision;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::error::{ApiError, InternalErrorDetail};
use crate::web::extract::client_address;
use crate::web::state::AppState;

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that validates the bearer access token against an active session.
///
/// If valid, inserts the `AuthContext` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or_else(ApiError::unauthenticated)?;

    let context = state.registry.authenticate(token).await.map_err(|e| {
        warn!(path = %req.uri().path(), "Rejected access token: {}", e);
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

//=========================================================================================
// Rate Limiting
//=========================================================================================

/// Tight limit for the unauthenticated credential endpoints.
pub async fn auth_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.auth_rate_limit;
    enforce(&state, "auth", limit, req, next).await
}

/// General limit for every API route.
pub async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.api_rate_limit;
    enforce(&state, "api", limit, req, next).await
}

async fn enforce(
    state: &AppState,
    scope: &str,
    limit: u32,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let address = client_address(
        req.headers(),
        req.extensions().get::<ConnectInfo<SocketAddr>>(),
    );
    let key = format!("{scope}:{address}");
    match state
        .rate_limiter
        .check(&key, limit, state.config.rate_limit_window)
    {
        RateDecision::Allowed { .. } => Ok(next.run(req).await),
        RateDecision::Limited { retry_after } => {
            warn!(ip = %address, scope, path = %req.uri().path(), "Rate limit exceeded");
            // Round up so clients never retry before the window has closed.
            let retry_after_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            Err(ApiError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            })
        }
    }
}

//=========================================================================================
// Error Details
//=========================================================================================

/// In development, replaces the generic 500 message with the underlying error.
pub async fn expose_error_details(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if state.config.environment.is_production() {
        return response;
    }
    match response.extensions().get::<InternalErrorDetail>().cloned() {
        Some(InternalErrorDetail(detail)) => {
            (response.status(), Json(json!({ "success": false, "error": detail }))).into_response()
        }
        None => response,
    }
}
