mod common;

use axum::http::{Method, StatusCode};
use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn non_admins_are_forbidden_and_audited() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;

    for uri in ["/security/logs", "/security/stats", "/users"] {
        let response = app.get(uri, &token).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(response.body["success"], false);
    }

    let (admin, _) = app.login("admin", "admin123").await;
    let denied = app.get("/security/logs?eventType=ACCESS_DENIED", &admin).await;
    let events = denied.body["data"].as_array().unwrap();
    assert!(events.len() >= 3);
}

#[tokio::test]
async fn nested_listing_returns_direct_children_only() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;

    let response = app.get("/terminal/filesystem?path=/research", &token).await;
    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<&str> = response.body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["experiments", "research_notes.md"]);

    let hidden = app.get("/terminal/filesystem?path=/military", &token).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let file = app.get("/terminal/filesystem/research/research_notes.md", &token).await;
    assert_eq!(file.status, StatusCode::OK);
    assert!(file.body["data"]["content"].as_str().unwrap().contains("Research Notes"));
}

#[tokio::test]
async fn admin_manages_filesystem_nodes() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;
    let (researcher, _) = app.login("researcher", "researcher123").await;

    let created = app
        .post(
            "/terminal/filesystem",
            Some(&admin),
            json!({ "path": "/public/memo.txt", "nodeType": "FILE", "content": "hello", "accessLevel": "PUBLIC" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let id = created.body["data"]["id"].as_str().unwrap().to_string();

    let duplicate = app
        .post(
            "/terminal/filesystem",
            Some(&admin),
            json!({ "path": "/public/memo.txt", "nodeType": "FILE" }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let forbidden = app
        .post(
            "/terminal/filesystem",
            Some(&researcher),
            json!({ "path": "/public/other.txt", "nodeType": "FILE" }),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let updated = app
        .request(
            Method::PUT,
            &format!("/terminal/filesystem/{id}"),
            Some(&admin),
            Some(json!({ "accessLevel": "ADMIN" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    let hidden = app.get("/terminal/filesystem/public/memo.txt", &researcher).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_directory_hides_its_descendants() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;

    let dir = app.get("/terminal/filesystem/research", &admin).await;
    let id = dir.body["data"]["id"].as_str().unwrap().to_string();

    let deleted = app
        .request(Method::DELETE, &format!("/terminal/filesystem/{id}"), Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK, "{}", deleted.body);

    let log = app
        .get("/terminal/filesystem/research/experiments/log_001.txt", &admin)
        .await;
    assert_eq!(log.status, StatusCode::NOT_FOUND);

    let bad_id = app
        .request(Method::DELETE, "/terminal/filesystem/research", Some(&admin), None)
        .await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn users_can_read_themselves_but_not_others() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;
    let (researcher, _) = app.login("researcher", "researcher123").await;

    let me = app.get("/auth/me", &researcher).await;
    let my_id = me.body["data"]["id"].as_str().unwrap().to_string();
    let admin_me = app.get("/auth/me", &admin).await;
    let admin_id = admin_me.body["data"]["id"].as_str().unwrap().to_string();

    assert_eq!(app.get(&format!("/users/{my_id}"), &researcher).await.status, StatusCode::OK);
    assert_eq!(
        app.get(&format!("/users/{admin_id}"), &researcher).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.get(&format!("/users/{my_id}"), &admin).await.status, StatusCode::OK);
}

#[tokio::test]
async fn deactivating_a_user_revokes_their_sessions() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;
    let (military, _) = app.login("military", "military123").await;

    let me = app.get("/auth/me", &military).await;
    let id = me.body["data"]["id"].as_str().unwrap().to_string();

    let deleted = app
        .request(Method::DELETE, &format!("/users/{id}"), Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["data"]["active"], false);

    assert_eq!(app.get("/auth/me", &military).await.status, StatusCode::UNAUTHORIZED);
    let relogin = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "military", "password": "military123" }),
        )
        .await;
    assert_eq!(relogin.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admins_cannot_deactivate_themselves() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;
    let me = app.get("/auth/me", &admin).await;
    let id = me.body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(Method::DELETE, &format!("/users/{id}"), Some(&admin), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_creates_users_with_any_role() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;

    let created = app
        .post(
            "/users",
            Some(&admin),
            json!({ "username": "second_admin", "email": "ops@phoenix.local", "password": "long-enough", "role": "ADMIN" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["data"]["role"], "ADMIN");

    let listed = app.get("/users", &admin).await;
    assert_eq!(listed.body["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn security_stats_and_sessions() {
    let app = spawn_app().await;
    let (admin, _) = app.login("admin", "admin123").await;
    app.login("researcher", "researcher123").await;

    let stats = app.get("/security/stats", &admin).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["data"]["totalUsers"], 4);
    assert_eq!(stats.body["data"]["activeAuthSessions"], 2);
    assert_eq!(stats.body["data"]["eventsLast24h"]["LOGIN"], 2);

    let sessions = app.get("/security/active-sessions", &admin).await;
    let sessions = sessions.body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].get("accessTokenHash").is_none());

    let alert = app
        .post("/security/alert", Some(&admin), json!({ "message": "Badge cloned at gate 4" }))
        .await;
    assert_eq!(alert.status, StatusCode::CREATED);
    assert_eq!(alert.body["data"]["eventType"], "SUSPICIOUS");

    let test = app.post("/security/webhook-test", Some(&admin), json!({})).await;
    assert_eq!(test.status, StatusCode::OK);
}
