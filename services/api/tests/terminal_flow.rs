mod common;

use axum::http::{Method, StatusCode};
use common::spawn_app;
use enclave_api::web::protocol::ServerMessage;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn researcher_explores_the_filesystem_terminal() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;
    let session = app.open_terminal(&token, "filesystem").await;

    let ls = app.run(&token, &session, "ls").await;
    assert_eq!(ls["success"], true);
    let listing = ls["output"].as_str().unwrap();
    assert!(listing.contains("[DIR]  research/"));
    assert!(listing.contains("[FILE] readme.txt"));
    assert!(!listing.contains("military"));
    assert!(!listing.contains("admin"));

    let cd = app.run(&token, &session, "cd research").await;
    assert_eq!(cd["currentDirectory"], "/research");

    let cat = app.run(&token, &session, "cat research_notes.md").await;
    assert_eq!(cat["success"], true);
    assert!(cat["output"].as_str().unwrap().starts_with("# Research Notes"));

    let forbidden = app.run(&token, &session, "cat /military/deployment_orders.txt").await;
    assert_eq!(forbidden["success"], false);
    assert!(!forbidden["output"].as_str().unwrap().contains("CLASSIFIED"));

    let detail = app.get(&format!("/terminal/sessions/{session}"), &token).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["data"]["currentDirectory"], "/research");
    assert_eq!(detail.body["data"]["commandHistory"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn terminal_types_dispatch_to_their_own_tables() {
    let app = spawn_app().await;
    let (token, _) = app.login("military", "military123").await;

    let military = app.open_terminal(&token, "MILITARY").await;
    let unknown = app.run(&token, &military, "ls").await;
    assert_eq!(unknown["success"], false);
    assert_eq!(unknown["output"], "Access denied: unrecognized directive 'ls'");

    let emergency = app.open_terminal(&token, "EMERGENCY").await;
    let clear = app.run(&token, &emergency, "clear").await;
    assert_eq!(clear["clearScreen"], true);

    let bad_type = app
        .post("/terminal/sessions", Some(&token), json!({ "terminalType": "QUANTUM" }))
        .await;
    assert_eq!(bad_type.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sessions_belong_to_their_owner() {
    let app = spawn_app().await;
    let (owner, _) = app.login("researcher", "researcher123").await;
    let (intruder, _) = app.login("military", "military123").await;
    let session = app.open_terminal(&owner, "FILESYSTEM").await;

    let peek = app.get(&format!("/terminal/sessions/{session}"), &intruder).await;
    assert_eq!(peek.status, StatusCode::NOT_FOUND);

    let hijack = app
        .post(
            &format!("/terminal/sessions/{session}/commands"),
            Some(&intruder),
            json!({ "command": "ls" }),
        )
        .await;
    assert_eq!(hijack.status, StatusCode::NOT_FOUND);

    let listed = app.get("/terminal/sessions", &intruder).await;
    assert!(listed.body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ended_sessions_reject_commands() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;
    let session = app.open_terminal(&token, "RESEARCHER").await;

    let ended = app
        .request(Method::DELETE, &format!("/terminal/sessions/{session}"), Some(&token), None)
        .await;
    assert_eq!(ended.status, StatusCode::OK);

    let after = app
        .post(
            &format!("/terminal/sessions/{session}/commands"),
            Some(&token),
            json!({ "command": "status" }),
        )
        .await;
    assert_eq!(after.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_session_ids_and_oversized_commands_are_400() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;

    let bad_id = app.get("/terminal/sessions/not-a-uuid", &token).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_id.body["success"], false);

    let session = app.open_terminal(&token, "FILESYSTEM").await;
    let oversized = app
        .post(
            &format!("/terminal/sessions/{session}/commands"),
            Some(&token),
            json!({ "command": "x".repeat(2000) }),
        )
        .await;
    assert_eq!(oversized.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn markup_in_commands_is_flagged_as_suspicious() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;
    let session = app.open_terminal(&token, "FILESYSTEM").await;

    app.run(&token, &session, "<script>alert(1)</script>").await;

    let (admin, _) = app.login("admin", "admin123").await;
    let logs = app.get("/security/logs?eventType=SUSPICIOUS", &admin).await;
    assert_eq!(logs.status, StatusCode::OK);
    assert!(!logs.body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn commands_are_audited() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;
    let session = app.open_terminal(&token, "FILESYSTEM").await;
    app.run(&token, &session, "pwd").await;

    let (admin, _) = app.login("admin", "admin123").await;
    let logs = app.get("/security/logs?eventType=COMMAND&limit=5", &admin).await;
    let events = logs.body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["metadata"]["command"], "pwd");
    assert_eq!(events[0]["metadata"]["terminalType"], "FILESYSTEM");
    assert_eq!(events[0]["metadata"]["success"], true);
}

#[tokio::test]
async fn only_sanitized_command_text_is_echoed() {
    let app = spawn_app().await;
    let (token, _) = app.login("researcher", "researcher123").await;
    let me = app.get("/auth/me", &token).await;
    let user_id: Uuid = me.body["data"]["id"].as_str().unwrap().parse().unwrap();
    let mut room = app.state.realtime.subscribe(user_id);
    let session = app.open_terminal(&token, "FILESYSTEM").await;

    let result = app
        .run(&token, &session, "pwd <img src=x onerror=alert(1)>")
        .await;
    assert_eq!(result["command"], "pwd img src=x alert(1)");
    assert!(!result["command"].as_str().unwrap().contains('<'));

    match room.try_recv().unwrap() {
        ServerMessage::CommandResult { command, .. } => {
            assert_eq!(command, "pwd img src=x alert(1)");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}
