//! services/api/src/web/extract.rs
//!
//! Request extractors shared by the handlers: JSON bodies with envelope-shaped
//! rejections, the caller's network origin and the authenticated principal.

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Request},
    http::{header, request::Parts, HeaderMap},
    Json,
};
use enclave_core::domain::{AuthContext, ClientInfo, EventType, SecurityEvent};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// JSON Bodies
//=========================================================================================

/// `Json<T>` whose rejections are reported as 400 validation errors.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// A single UUID path segment. Malformed ids are 400s rather than axum's plain-text rejection.
pub struct PathId(pub Uuid);

impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        parse_id(&raw).map(PathId)
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("'{raw}' is not a valid id")))
}

//=========================================================================================
// Client Origin
//=========================================================================================

/// The caller's address and user agent.
pub struct RequestClient(pub ClientInfo);

/// Socket peer first, then the first `X-Forwarded-For` hop, then `unknown`.
pub fn client_address(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(ConnectInfo(addr)) = connect_info {
        return addr.ip().to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn client_info(parts: &Parts) -> ClientInfo {
    let ip = client_address(&parts.headers, parts.extensions.get::<ConnectInfo<SocketAddr>>());
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    ClientInfo::new(ip, user_agent)
}

impl<S> FromRequestParts<S> for RequestClient
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestClient(client_info(parts)))
    }
}

//=========================================================================================
// Authenticated Principals
//=========================================================================================

/// Any authenticated user. Requires the `require_auth` middleware upstream.
pub struct CurrentUser(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthenticated)
    }
}

/// An authenticated ADMIN. Anyone else gets 403 and an ACCESS_DENIED event.
pub struct AdminUser(pub AuthContext);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role.is_admin() {
            return Ok(AdminUser(user));
        }
        deny(state, &user, &client_info(parts), parts.uri.path()).await;
        Err(ApiError::Authorization("Administrator role required".to_string()))
    }
}

/// Logs and records a refused authorization check.
pub async fn deny(state: &AppState, user: &AuthContext, client: &ClientInfo, resource: &str) {
    warn!(
        user_id = %user.user_id,
        role = %user.role,
        ip = %client.ip_address,
        resource,
        "Access denied"
    );
    state
        .security
        .record(
            SecurityEvent::new(EventType::AccessDenied, format!("Access denied to {resource}"))
                .for_user(user.user_id)
                .from_client(client)
                .with_metadata(json!({ "role": user.role.as_str(), "resource": resource })),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_header_is_used_without_a_socket_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_address(&headers, None), "203.0.113.7");
        assert_eq!(client_address(&HeaderMap::new(), None), "unknown");

        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242)));
        assert_eq!(client_address(&headers, Some(&peer)), "192.0.2.1");
    }

    #[test]
    fn ids_must_be_uuids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_id("42"), Err(ApiError::Validation(_))));
    }
}
