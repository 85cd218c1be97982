//! services/api/src/web/filesystem.rs
//!
//! Browsing and administering the virtual filesystem. Reads are filtered by
//! the caller's role; hidden and missing nodes are indistinguishable.
//!
//! PUT and DELETE share the `{*path}` route with GET, so their single
//! segment is parsed as the node id.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use enclave_core::domain::{AccessLevel, NodeType, NodeUpdate};
use enclave_core::{paths, CreateNode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{parse_id, AdminUser, CurrentUser, ValidatedJson};
use crate::web::rest::{ApiResponse, DirectoryListingView, MessageView, NodeView};
use crate::web::state::AppState;

#[derive(Deserialize, IntoParams)]
pub struct ListQuery {
    /// Directory to list. Defaults to `/`.
    pub path: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeRequest {
    pub path: String,
    /// FILE or DIRECTORY.
    pub node_type: String,
    pub content: Option<String>,
    /// Defaults to PUBLIC.
    pub access_level: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodeRequest {
    pub content: Option<String>,
    pub access_level: Option<String>,
}

fn parse_access_level(raw: Option<&str>) -> Result<Option<AccessLevel>, ApiError> {
    raw.map(str::parse::<AccessLevel>)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// GET /terminal/filesystem?path= - List a directory.
#[utoipa::path(
    get,
    path = "/terminal/filesystem",
    tag = "filesystem",
    params(ListQuery),
    responses(
        (status = 200, description = "Visible direct children, directories first", body = ApiResponse<DirectoryListingView>),
        (status = 404, description = "No such directory")
    ),
    security(("bearer" = []))
)]
pub async fn list_directory_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<DirectoryListingView>>, ApiError> {
    let path = paths::normalize(query.path.as_deref().unwrap_or("/"));
    let entries = state.filesystem.list_children(&path, user.role).await?;
    Ok(ApiResponse::ok(DirectoryListingView {
        path,
        entries: entries.into_iter().map(NodeView::summary).collect(),
    }))
}

/// GET /terminal/filesystem/{path} - A single node; files include their content.
#[utoipa::path(
    get,
    path = "/terminal/filesystem/{path}",
    tag = "filesystem",
    params(("path" = String, Path, description = "Node path without the leading slash")),
    responses(
        (status = 200, description = "The node", body = ApiResponse<NodeView>),
        (status = 404, description = "No such file or directory")
    ),
    security(("bearer" = []))
)]
pub async fn get_node_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<NodeView>>, ApiError> {
    let node = state.filesystem.get_node(&format!("/{path}"), user.role).await?;
    Ok(ApiResponse::ok(NodeView::from(node)))
}

/// POST /terminal/filesystem - Create a node (administrators only).
#[utoipa::path(
    post,
    path = "/terminal/filesystem",
    tag = "filesystem",
    request_body = CreateNodeRequest,
    responses(
        (status = 201, description = "Node created", body = ApiResponse<NodeView>),
        (status = 400, description = "Invalid path, type or missing parent"),
        (status = 403, description = "Administrator role required"),
        (status = 409, description = "A node already exists at the path")
    ),
    security(("bearer" = []))
)]
pub async fn create_node_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ValidatedJson(req): ValidatedJson<CreateNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let node_type = req
        .node_type
        .parse::<NodeType>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if node_type == NodeType::Directory && req.content.is_some() {
        return Err(ApiError::Validation(
            "Directories cannot hold content".to_string(),
        ));
    }
    let access_level = parse_access_level(req.access_level.as_deref())?.unwrap_or(AccessLevel::Public);

    let node = state
        .filesystem
        .create(CreateNode {
            path: req.path,
            node_type,
            content: req.content,
            access_level,
        })
        .await?;
    info!(admin_id = %admin.user_id, node_id = %node.id, path = %node.path, "Filesystem node created");
    Ok(ApiResponse::created(NodeView::from(node)))
}

/// PUT /terminal/filesystem/{id} - Change content or access level (administrators only).
#[utoipa::path(
    put,
    path = "/terminal/filesystem/{id}",
    tag = "filesystem",
    params(("id" = Uuid, Path, description = "Node id")),
    request_body = UpdateNodeRequest,
    responses(
        (status = 200, description = "Node updated", body = ApiResponse<NodeView>),
        (status = 400, description = "Invalid id or content on a directory"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such node")
    ),
    security(("bearer" = []))
)]
pub async fn update_node_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(raw_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateNodeRequest>,
) -> Result<Json<ApiResponse<NodeView>>, ApiError> {
    let node_id: Uuid = parse_id(&raw_id)?;
    let update = NodeUpdate {
        content: req.content,
        access_level: parse_access_level(req.access_level.as_deref())?,
    };
    let node = state.filesystem.update(node_id, update).await?;
    info!(admin_id = %admin.user_id, node_id = %node.id, "Filesystem node updated");
    Ok(ApiResponse::ok(NodeView::from(node)))
}

/// DELETE /terminal/filesystem/{id} - Soft-delete a node and its descendants (administrators only).
#[utoipa::path(
    delete,
    path = "/terminal/filesystem/{id}",
    tag = "filesystem",
    params(("id" = Uuid, Path, description = "Node id")),
    responses(
        (status = 200, description = "Node removed", body = ApiResponse<MessageView>),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such node")
    ),
    security(("bearer" = []))
)]
pub async fn delete_node_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<MessageView>>, ApiError> {
    let node_id = parse_id(&raw_id)?;
    let removed = state.filesystem.delete(node_id).await?;
    info!(admin_id = %admin.user_id, node_id = %node_id, removed, "Filesystem node deleted");
    Ok(ApiResponse::ok(MessageView::new(format!(
        "Removed {removed} node(s)"
    ))))
}
