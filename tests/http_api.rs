//! Integration tests for the HTTP surface: routing, auth enforcement, and
//! request/response shapes, driven directly against the `axum::Router`
//! without binding a real socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use clap::Parser;
use http_body_util::BodyExt;
use rec::config::Config;
use rec::http::{build_router, AppState};
use rec::registry::SessionRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn app() -> axum::Router {
    let config = Config::parse_from(["remote"]);
    let state = Arc::new(AppState {
        sessions: SessionRegistry::new(),
        config,
        auth_token: TOKEN.to_string(),
        shutdown: Notify::new(),
    });
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, auth: bool, body: Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if auth {
        builder = builder.header("authorization", format!("Bearer {TOKEN}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn hello_and_is_alive_need_no_auth() {
    let app = app();

    let response = app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/is_alive").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_alive"], true);
}

#[tokio::test]
async fn protected_route_without_token_is_rejected() {
    let app = app();
    let request = json_request("POST", "/create_session", false, json!({"session": "s1"}));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_wrong_token_is_rejected() {
    let app = app();
    let mut request = json_request("POST", "/create_session", false, json!({"session": "s1"}));
    request
        .headers_mut()
        .insert("authorization", "Bearer wrong-token".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_run_and_close_session_round_trip() {
    let app = app();

    let create = json_request("POST", "/create_session", true, json!({"session": "s1"}));
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["session_type"], "bash");

    let run = json_request(
        "POST",
        "/run_in_session",
        true,
        json!({"session": "s1", "command": "echo hi from http"}),
    );
    let response = app.clone().oneshot(run).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["exit_code"], 0);
    assert!(body["output"].as_str().unwrap().contains("hi from http"));

    let close = json_request("POST", "/close_session", true, json!({"session": "s1"}));
    let response = app.oneshot(close).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_in_session_against_unknown_session_is_not_found() {
    let app = app();
    let run = json_request(
        "POST",
        "/run_in_session",
        true,
        json!({"session": "ghost", "command": "echo hi"}),
    );
    let response = app.oneshot(run).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error_kind"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn execute_runs_a_one_shot_command() {
    let app = app();
    let request = json_request(
        "POST",
        "/execute",
        true,
        json!({"command": ["echo", "one-shot"], "shell": false}),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["exit_code"], 0);
    assert_eq!(body["stdout"], "one-shot\n");
}

#[tokio::test]
async fn write_then_read_file_round_trips_through_http() {
    let app = app();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.txt");
    let path_str = path.to_str().unwrap();

    let write = json_request(
        "POST",
        "/write_file",
        true,
        json!({"path": path_str, "content": "hello via http", "create_parents": false}),
    );
    let response = app.clone().oneshot(write).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let read = json_request("POST", "/read_file", true, json!({"path": path_str}));
    let response = app.oneshot(read).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"], "hello via http");
}

#[tokio::test]
async fn read_file_missing_path_is_not_found() {
    let app = app();
    let read = json_request("POST", "/read_file", true, json!({"path": "/nonexistent/missing.txt"}));
    let response = app.oneshot(read).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error_kind"], "FILE_NOT_FOUND");
}

#[tokio::test]
async fn close_endpoint_notifies_shutdown() {
    let config = Config::parse_from(["remote"]);
    let state = Arc::new(AppState {
        sessions: SessionRegistry::new(),
        config,
        auth_token: TOKEN.to_string(),
        shutdown: Notify::new(),
    });
    let app = build_router(state.clone());

    let notified = state.shutdown.notified();
    let request = json_request("POST", "/close", true, json!({}));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    notified.await;
}
