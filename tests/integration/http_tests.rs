//! HTTP facade tests over a real listener.
//!
//! Each test binds an ephemeral port, serves the router with a fake engine,
//! and talks to it with `reqwest`.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use connect_four_relay::http::{self, AppState};

use super::test_helpers::{app_state_for, fake_engine, ANSWERING_ENGINE, OPENING_ENGINE, SILENT_ENGINE};

/// A running facade over a fake engine.
struct TestServer {
    base_url: String,
    state: Arc<AppState>,
    ct: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(state: Arc<AppState>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let ct = CancellationToken::new();

        let serve_state = Arc::clone(&state);
        let serve_ct = ct.clone();
        tokio::spawn(async move {
            let _ = http::serve(listener, serve_state, serve_ct).await;
        });

        Self {
            base_url,
            state,
            ct,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .expect("request");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }

    async fn model_move(&self, game_id: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}/api/get-model-move?gameId={game_id}", self.base_url))
            .send()
            .await
            .expect("request");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }

    async fn stop(self) {
        self.ct.cancel();
        self.state.registry.shutdown().await;
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "ok");

    server.stop().await;
}

#[tokio::test]
async fn engine_opening_move_is_served() {
    let engine = fake_engine(OPENING_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 5)).await;

    let (status, body) = server
        .post(
            "/api/start-game",
            &json!({ "gameId": "g1", "playerOrder": "second" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Game started" }));

    let (status, body) = server.model_move("g1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "move": 3 }));

    server.stop().await;
}

#[tokio::test]
async fn human_move_round_trip() {
    let engine = fake_engine(ANSWERING_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 5)).await;

    server
        .post("/api/start-game", &json!({ "gameId": "g1", "playerOrder": "first" }))
        .await;

    let (status, body) = server
        .post("/api/send-move", &json!({ "gameId": "g1", "move": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Move sent to engine"));

    let (status, body) = server.model_move("g1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "move": 3 }));

    server.stop().await;
}

#[tokio::test]
async fn invalid_moves_are_bad_requests() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;
    server
        .post("/api/start-game", &json!({ "gameId": "g1", "playerOrder": "first" }))
        .await;

    for bad in [json!(9), json!(-1), json!("three"), json!(2.5), Value::Null] {
        let (status, body) = server
            .post("/api/send-move", &json!({ "gameId": "g1", "move": bad }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "move {bad}");
        assert!(
            body["error"].as_str().is_some_and(|e| e.starts_with("invalid move")),
            "move {bad}: {body}"
        );
    }

    server.stop().await;
}

#[tokio::test]
async fn unknown_game_is_not_found() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;

    let (status, body) = server
        .post("/api/send-move", &json!({ "gameId": "ghost", "move": 3 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("ghost")));

    let (status, _) = server.model_move("ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn silent_engine_times_out_with_504_and_keeps_the_game() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 1)).await;
    server
        .post("/api/start-game", &json!({ "gameId": "g1", "playerOrder": "first" }))
        .await;

    let (status, body) = server.model_move("g1").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().is_some_and(|e| e.starts_with("move timeout")));

    let (status, _) = server
        .post("/api/send-move", &json!({ "gameId": "g1", "move": 0 }))
        .await;
    assert_eq!(status, StatusCode::OK, "game survives a timeout");

    server.stop().await;
}

#[tokio::test]
async fn malformed_start_game_is_rejected() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;

    let (status, body) = server
        .post("/api/start-game", &json!({ "gameId": "g1", "playerOrder": "sideways" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.starts_with("invalid request")));

    let (status, _) = server
        .post("/api/start-game", &json!({ "playerOrder": "first" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(server.state.registry.is_empty().await);

    server.stop().await;
}

#[tokio::test]
async fn missing_game_id_query_is_rejected() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;

    let resp = server
        .client
        .get(format!("{}/api/get-model-move", server.base_url))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn end_game_removes_the_session_and_is_idempotent() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;
    server
        .post("/api/start-game", &json!({ "gameId": "g1", "playerOrder": "first" }))
        .await;

    let (status, body) = server.post("/api/end-game", &json!({ "gameId": "g1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Game ended"));
    assert!(server.state.registry.get("g1").await.is_none());

    let (status, body) = server.post("/api/end-game", &json!({ "gameId": "g1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("No such game"));

    let (status, _) = server.model_move("g1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn cors_preflight_and_headers() {
    let engine = fake_engine(SILENT_ENGINE);
    let server = TestServer::start(app_state_for(&engine, 2)).await;

    let preflight = server
        .client
        .request(Method::OPTIONS, format!("{}/api/send-move", server.base_url))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("preflight");
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        preflight
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("request");
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );

    server.stop().await;
}
