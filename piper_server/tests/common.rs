//! Common utilities for integration tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use piper_core::testing::{scripted_engine, ScriptedSession};
use piper_server::{build_router, config::ServerConfig, AppState};
use tower::ServiceExt;

/// Create a test app backed by a scripted session (no model files needed)
pub fn create_test_app() -> Router {
    create_test_app_with(ServerConfig::default())
}

pub fn create_test_app_with(config: ServerConfig) -> Router {
    create_test_app_with_session(ScriptedSession::new(3), config)
}

pub fn create_test_app_with_session(session: ScriptedSession, config: ServerConfig) -> Router {
    let engine = scripted_engine(session).unwrap();
    build_router(AppState::new(engine, config))
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}
