//! Integration tests for the HTTP host

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use piper_core::testing::ScriptedSession;
use piper_server::config::ServerConfig;
use base64::Engine;
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let (status, headers, body) = get(create_test_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_api_prefix_routes() {
    let (status, _, body) = get(create_test_app(), "/api/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_list_voices() {
    let (status, _, body) = get(create_test_app(), "/voices").await;
    assert_eq!(status, StatusCode::OK);

    let voices: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(voices["voices"], json!(["en-us"]));
    assert_eq!(voices["default_voice"], "en-us");
    assert_eq!(voices["sample_rate"], 16000);
    assert!(voices["scales"]["pitch"].is_number());
}

#[tokio::test]
async fn test_tts_endpoint_success() {
    let (status, body) = post_json(
        create_test_app(),
        "/tts",
        json!({ "text": "Hello, this is a test. And a second sentence!" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_rate"], 16000);
    assert!(body["samples"].as_u64().unwrap() > 0);
    assert!(body["duration_ms"].is_number());

    let wav = base64::engine::general_purpose::STANDARD
        .decode(body["audio_base64"].as_str().unwrap())
        .unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(wav.len() as u64, 44 + body["samples"].as_u64().unwrap() * 2);
}

#[tokio::test]
async fn test_tts_pitch_override_changes_audio() {
    let app = create_test_app();
    let (_, base) = post_json(app.clone(), "/tts", json!({ "text": "Same words." })).await;
    let (status, raised) = post_json(app, "/tts", json!({ "text": "Same words.", "pitch": 1.5 })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(base["samples"], raised["samples"]);
    assert_ne!(base["audio_base64"], raised["audio_base64"]);
}

#[tokio::test]
async fn test_tts_endpoint_validation_empty_text() {
    let (status, body) = post_json(create_test_app(), "/tts", json!({ "text": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty"));
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_tts_endpoint_validation_too_long() {
    let config = ServerConfig {
        max_text_length: 20,
        ..Default::default()
    };
    let (status, body) = post_json(
        create_test_app_with(config),
        "/tts",
        json!({ "text": "a".repeat(21) }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too long"));
}

#[tokio::test]
async fn test_tts_endpoint_invalid_scale() {
    let (status, body) = post_json(
        create_test_app(),
        "/tts",
        json!({ "text": "Hello.", "speed": 0.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("speed"));
}

#[tokio::test]
async fn test_tts_endpoint_untokenizable_text() {
    let (status, body) = post_json(create_test_app(), "/tts", json!({ "text": "日本語" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let app = create_test_app();
    let (first, second) = tokio::join!(
        post_json(app.clone(), "/tts", json!({ "text": "First request." })),
        post_json(app, "/tts", json!({ "text": "Second one." })),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_ne!(first.1["samples"], second.1["samples"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_health_responds_while_synthesis_runs() {
    // One sentence, three steps of 200ms each.
    let session = ScriptedSession::new(3).with_step_delay(Duration::from_millis(200));
    let app = create_test_app_with_session(session, ServerConfig::default());

    let tts = tokio::spawn(post_json(app.clone(), "/tts", json!({ "text": "Slow one." })));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let health = tokio::spawn(get(app, "/health"));
    let (status, _, _) = tokio::time::timeout(Duration::from_millis(400), health)
        .await
        .expect("health check blocked behind synthesis")
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(!tts.is_finished());

    let (status, body) = tts.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body["samples"].as_u64().unwrap() > 0);
}
