//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration, login, token refresh, logout and
//! password changes. The refresh token travels in the JSON body and in an
//! HttpOnly cookie scoped to `/auth`.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use enclave_core::domain::Role;
use enclave_core::{LoginOutcome, Registration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::web::extract::{CurrentUser, RequestClient, ValidatedJson};
use crate::web::rest::{ApiResponse, AuthView, MessageView, TokenView, UserView};
use crate::web::state::AppState;

const REFRESH_COOKIE: &str = "refreshToken";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to RESEARCHER. ADMIN cannot be self-assigned.
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusView {
    pub valid: bool,
    pub user_id: Uuid,
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub session_id: Uuid,
}

//=========================================================================================
// Cookie Helpers
//=========================================================================================

fn refresh_cookie(config: &Config, token: &str) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/auth; Max-Age={}",
        config.refresh_token_ttl.num_seconds()
    );
    if config.environment.is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cleared_refresh_cookie(config: &Config) -> String {
    refresh_cookie(config, "").replace(
        &format!("Max-Age={}", config.refresh_token_ttl.num_seconds()),
        "Max-Age=0",
    )
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix(name)?.strip_prefix('='))
        .filter(|v| !v.is_empty())
}

fn signed_in(
    state: &AppState,
    status: StatusCode,
    outcome: LoginOutcome,
) -> impl IntoResponse {
    let cookie = refresh_cookie(&state.config, &outcome.tokens.refresh_token);
    let body = AuthView {
        user: UserView::from(outcome.user),
        tokens: TokenView::from(outcome.tokens),
    };
    (status, [(header::SET_COOKIE, cookie)], ApiResponse::ok(body))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create an account and sign in.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = ApiResponse<AuthView>),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "ADMIN cannot be self-assigned"),
        (status = 409, description = "Username or email already registered"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    RequestClient(client): RequestClient,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = req
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let outcome = state
        .registry
        .register(
            Registration {
                username: req.username,
                email: req.email,
                password: req.password,
                role,
            },
            &client,
        )
        .await?;
    Ok(signed_in(&state, StatusCode::CREATED, outcome))
}

/// POST /auth/login - Exchange credentials for a token pair.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<AuthView>),
        (status = 401, description = "Invalid credentials or deactivated account"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    RequestClient(client): RequestClient,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }
    let outcome = state
        .registry
        .login(req.username.trim(), &req.password, &client)
        .await?;
    Ok(signed_in(&state, StatusCode::OK, outcome))
}

/// POST /auth/refresh - Rotate the token pair.
///
/// The refresh token is read from the JSON body, falling back to the
/// `refreshToken` cookie. The presented token is single use.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Optional when the cookie is present"),
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenView>),
        (status = 401, description = "Invalid, expired or already used refresh token")
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    RequestClient(client): RequestClient,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: RefreshRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?
    };
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(&headers, REFRESH_COOKIE).map(str::to_string))
        .ok_or_else(|| ApiError::Authentication("Refresh token required".to_string()))?;

    let tokens = state.registry.refresh(&token, &client).await?;
    let cookie = refresh_cookie(&state.config, &tokens.refresh_token);
    Ok(([(header::SET_COOKIE, cookie)], ApiResponse::ok(TokenView::from(tokens))))
}

/// POST /auth/logout - End every session of the caller.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = ApiResponse<MessageView>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    RequestClient(client): RequestClient,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.logout(user.user_id, &client).await?;
    let cookie = cleared_refresh_cookie(&state.config);
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(MessageView::new("Logged out successfully")),
    ))
}

/// GET /auth/me - The authenticated user.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserView>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let user = state.accounts.get(user.user_id).await?;
    Ok(ApiResponse::ok(UserView::from(user)))
}

/// POST /auth/change-password - Replace the password and sign out everywhere.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions closed", body = ApiResponse<MessageView>),
        (status = 400, description = "Current password incorrect or new password too weak"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    RequestClient(client): RequestClient,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .change_password(user.user_id, &req.current_password, &req.new_password, &client)
        .await?;
    let cookie = cleared_refresh_cookie(&state.config);
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(MessageView::new(
            "Password changed successfully. Please log in again.",
        )),
    ))
}

/// GET /auth/verify-token - Confirms the bearer token is still accepted.
#[utoipa::path(
    get,
    path = "/auth/verify-token",
    tag = "auth",
    responses(
        (status = 200, description = "Token is valid", body = ApiResponse<TokenStatusView>),
        (status = 401, description = "Token invalid, expired or revoked")
    ),
    security(("bearer" = []))
)]
pub async fn verify_token_handler(CurrentUser(user): CurrentUser) -> Json<ApiResponse<TokenStatusView>> {
    ApiResponse::ok(TokenStatusView {
        valid: true,
        user_id: user.user_id,
        username: user.username,
        role: user.role,
        session_id: user.session_id,
    })
}
