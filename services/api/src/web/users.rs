//! services/api/src/web/users.rs
//!
//! User administration. Users are deactivated, never deleted.

use axum::{extract::State, response::IntoResponse, Json};
use enclave_core::domain::{Role, UserUpdate};
use enclave_core::NewAccount;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{deny, AdminUser, CurrentUser, PathId, RequestClient, ValidatedJson};
use crate::web::rest::{ApiResponse, UserView};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Any role, including ADMIN.
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse::<Role>()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// GET /users - Every user.
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = ApiResponse<Vec<UserView>>),
        (status = 403, description = "Administrator role required")
    ),
    security(("bearer" = []))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<Vec<UserView>>>, ApiError> {
    let users = state.accounts.list().await?;
    Ok(ApiResponse::ok(users.into_iter().map(UserView::from).collect()))
}

/// POST /users - Create an account with any role.
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserView>),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator role required"),
        (status = 409, description = "Username or email already registered")
    ),
    security(("bearer" = []))
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = parse_role(&req.role)?;
    let user = state
        .accounts
        .create(NewAccount {
            username: req.username,
            email: req.email,
            password: req.password,
            role,
        })
        .await?;
    Ok(ApiResponse::created(UserView::from(user)))
}

/// GET /users/{id} - One user. Non-administrators may only read themselves.
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "The user", body = ApiResponse<UserView>),
        (status = 403, description = "Not allowed to read this user"),
        (status = 404, description = "No such user")
    ),
    security(("bearer" = []))
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    RequestClient(client): RequestClient,
    PathId(user_id): PathId,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    if caller.user_id != user_id && !caller.role.is_admin() {
        deny(&state, &caller, &client, &format!("/users/{user_id}")).await;
        return Err(ApiError::Authorization(
            "You may only view your own account".to_string(),
        ));
    }
    let user = state.accounts.get(user_id).await?;
    Ok(ApiResponse::ok(UserView::from(user)))
}

/// PUT /users/{id} - Change email, role or active flag.
///
/// Deactivation closes every session the user holds.
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = ApiResponse<UserView>),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such user"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = []))
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    RequestClient(client): RequestClient,
    PathId(user_id): PathId,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    if user_id == admin.user_id && req.active == Some(false) {
        return Err(ApiError::Validation(
            "Administrators cannot deactivate their own account".to_string(),
        ));
    }
    let update = UserUpdate {
        email: req.email,
        role: req.role.as_deref().map(parse_role).transpose()?,
        active: req.active,
    };
    let user = state
        .accounts
        .update(user_id, update, admin.user_id, &client)
        .await?;
    Ok(ApiResponse::ok(UserView::from(user)))
}

/// DELETE /users/{id} - Deactivate a user and close all their sessions.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Deactivated user", body = ApiResponse<UserView>),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such user")
    ),
    security(("bearer" = []))
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    RequestClient(client): RequestClient,
    PathId(user_id): PathId,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    if user_id == admin.user_id {
        return Err(ApiError::Validation(
            "Administrators cannot deactivate their own account".to_string(),
        ));
    }
    let user = state
        .accounts
        .deactivate(user_id, admin.user_id, &client)
        .await?;
    Ok(ApiResponse::ok(UserView::from(user)))
}
