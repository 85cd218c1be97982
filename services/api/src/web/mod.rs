//! services/api/src/web/mod.rs
//!
//! HTTP and WebSocket surface of the service.

pub mod auth;
pub mod extract;
pub mod filesystem;
pub mod middleware;
pub mod protocol;
pub mod realtime;
pub mod rest;
pub mod security;
pub mod state;
pub mod terminal;
pub mod users;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::web::middleware::{api_rate_limit, auth_rate_limit, expose_error_details, require_auth};
use crate::web::rest::ApiDoc;
use crate::web::state::AppState;

// Re-export the main WebSocket handler to make it easily accessible.
pub use ws_handler::ws_handler;

/// Builds the complete application router. CORS is left to the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required, tighter rate limit)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit,
        ));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/verify-token", get(auth::verify_token_handler))
        .route(
            "/terminal/sessions",
            post(terminal::create_session_handler).get(terminal::list_sessions_handler),
        )
        .route(
            "/terminal/sessions/{id}",
            get(terminal::get_session_handler).delete(terminal::end_session_handler),
        )
        .route(
            "/terminal/sessions/{id}/commands",
            post(terminal::execute_command_handler),
        )
        .route(
            "/terminal/filesystem",
            get(filesystem::list_directory_handler).post(filesystem::create_node_handler),
        )
        .route(
            "/terminal/filesystem/{*path}",
            get(filesystem::get_node_handler)
                .put(filesystem::update_node_handler)
                .delete(filesystem::delete_node_handler),
        )
        .route("/security/logs", get(security::logs_handler))
        .route("/security/stats", get(security::stats_handler))
        .route("/security/active-sessions", get(security::active_sessions_handler))
        .route("/security/alert", post(security::alert_handler))
        .route("/security/webhook-test", post(security::webhook_test_handler))
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/users/{id}",
            get(users::get_user_handler)
                .put(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Authenticates itself from the query string.
        .route("/ws", get(ws_handler))
        .fallback(|| async { ApiError::NotFound("Route not found".to_string()) })
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            api_rate_limit,
        ))
        .route("/health", get(rest::health_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            expose_error_details,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
