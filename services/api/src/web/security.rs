//! services/api/src/web/security.rs
//!
//! Administrative access to the audit log, and manual alerting.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use enclave_core::domain::{EventFilter, EventType};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{AdminUser, RequestClient, ValidatedJson};
use crate::web::rest::{
    ActiveSessionView, ApiResponse, MessageView, SecurityEventView, StatsView,
};
use crate::web::state::AppState;

const MAX_PAGE_SIZE: i64 = 500;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub event_type: Option<String>,
    pub user_id: Option<Uuid>,
    /// 1 to 500, default 50.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LogsQuery {
    fn into_filter(self) -> Result<EventFilter, ApiError> {
        let defaults = EventFilter::default();
        let event_type = self
            .event_type
            .as_deref()
            .map(str::parse::<EventType>)
            .transpose()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(EventFilter {
            event_type,
            user_id: self.user_id,
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub message: String,
    /// The user the alert concerns, if any.
    pub user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

/// GET /security/logs - Browse the audit log, newest first.
#[utoipa::path(
    get,
    path = "/security/logs",
    tag = "security",
    params(LogsQuery),
    responses(
        (status = 200, description = "Matching events", body = ApiResponse<Vec<SecurityEventView>>),
        (status = 400, description = "Unknown event type"),
        (status = 403, description = "Administrator role required")
    ),
    security(("bearer" = []))
)]
pub async fn logs_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<Vec<SecurityEventView>>>, ApiError> {
    let events = state.security.recent(query.into_filter()?).await?;
    Ok(ApiResponse::ok(
        events.into_iter().map(SecurityEventView::from).collect(),
    ))
}

/// GET /security/stats - Event counts for the last 24 hours and live totals.
#[utoipa::path(
    get,
    path = "/security/stats",
    tag = "security",
    responses(
        (status = 200, description = "Statistics", body = ApiResponse<StatsView>),
        (status = 403, description = "Administrator role required")
    ),
    security(("bearer" = []))
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<StatsView>>, ApiError> {
    let stats = state.security.stats().await?;
    Ok(ApiResponse::ok(StatsView::from(stats)))
}

/// GET /security/active-sessions - Every active authentication session.
#[utoipa::path(
    get,
    path = "/security/active-sessions",
    tag = "security",
    responses(
        (status = 200, description = "Active sessions", body = ApiResponse<Vec<ActiveSessionView>>),
        (status = 403, description = "Administrator role required")
    ),
    security(("bearer" = []))
)]
pub async fn active_sessions_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<Vec<ActiveSessionView>>>, ApiError> {
    let sessions = state.db.list_active_auth_sessions().await?;
    Ok(ApiResponse::ok(
        sessions.into_iter().map(ActiveSessionView::from).collect(),
    ))
}

/// POST /security/alert - Record a SUSPICIOUS event and notify.
#[utoipa::path(
    post,
    path = "/security/alert",
    tag = "security",
    request_body = AlertRequest,
    responses(
        (status = 201, description = "Alert recorded", body = ApiResponse<SecurityEventView>),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Administrator role required")
    ),
    security(("bearer" = []))
)]
pub async fn alert_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    RequestClient(client): RequestClient,
    ValidatedJson(req): ValidatedJson<AlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("Alert message is required".to_string()));
    }
    let metadata = json!({
        "raisedBy": admin.user_id,
        "details": req.details.unwrap_or(serde_json::Value::Null),
    });
    let event = state
        .security
        .raise_alert(req.user_id, message, &client, metadata)
        .await;
    Ok(ApiResponse::created(SecurityEventView::from(event)))
}

/// POST /security/webhook-test - Send a test notification through the alert channel.
#[utoipa::path(
    post,
    path = "/security/webhook-test",
    tag = "security",
    responses(
        (status = 200, description = "Notification sent", body = ApiResponse<MessageView>),
        (status = 403, description = "Administrator role required"),
        (status = 500, description = "Notifier failed")
    ),
    security(("bearer" = []))
)]
pub async fn webhook_test_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    RequestClient(client): RequestClient,
) -> Result<Json<ApiResponse<MessageView>>, ApiError> {
    state.security.test_notifier(admin.user_id, &client).await?;
    Ok(ApiResponse::ok(MessageView::new("Test notification sent")))
}
