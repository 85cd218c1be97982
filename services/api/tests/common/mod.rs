//! Shared harness: the full router over an in-memory store seeded with the
//! demo dataset, driven request by request with `oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use enclave_api::adapters::{InMemoryRateLimiter, TracingNotifier};
use enclave_api::config::Config;
use enclave_api::web::{router, state::AppState};
use enclave_core::{seed::seed_demo_data, DatabaseService, InMemoryStore, PasswordService};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

pub async fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let mut vars: HashMap<String, String> = [
        ("JWT_SECRET", "integration-access-secret"),
        ("JWT_REFRESH_SECRET", "integration-refresh-secret"),
        ("SEED_DEMO_DATA", "true"),
        ("AUTH_RATE_LIMIT", "1000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    let config = Arc::new(Config::from_map(&vars).expect("test config"));

    let db: Arc<dyn DatabaseService> = Arc::new(InMemoryStore::new());
    let passwords = Arc::new(PasswordService::with_params(1024, 1, 1).expect("argon2 params"));
    seed_demo_data(db.clone(), &passwords).await.expect("seed");

    let state = Arc::new(AppState::build(
        config,
        db,
        passwords,
        Arc::new(TracingNotifier),
        Arc::new(InMemoryRateLimiter::new()),
    ));
    TestApp {
        router: router(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Logs in and returns `(access_token, refresh_token)`.
    pub async fn login(&self, username: &str, password: &str) -> (String, String) {
        let response = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        let tokens = &response.body["data"]["tokens"];
        (
            tokens["accessToken"].as_str().unwrap().to_string(),
            tokens["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Opens a terminal of the given type and returns its id.
    pub async fn open_terminal(&self, token: &str, terminal_type: &str) -> String {
        let response = self
            .post(
                "/terminal/sessions",
                Some(token),
                serde_json::json!({ "terminalType": terminal_type }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn run(&self, token: &str, session_id: &str, command: &str) -> Value {
        let response = self
            .post(
                &format!("/terminal/sessions/{session_id}/commands"),
                Some(token),
                serde_json::json!({ "command": command }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["data"].clone()
    }
}
