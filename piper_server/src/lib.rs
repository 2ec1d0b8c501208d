pub mod config;
pub mod error;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use piper_core::{ControlScales, TtsEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::{validate_scale, validate_tts_request};

#[derive(Clone)]
pub struct AppState {
    /// One engine, one synthesis at a time: requests queue on this lock.
    pub engine: Arc<Mutex<TtsEngine>>,
    pub voice: Arc<VoiceInfo>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(engine: TtsEngine, config: ServerConfig) -> Self {
        let voice = VoiceInfo {
            voices: engine.voices(),
            default_voice: engine.config().voice.clone(),
            sample_rate: engine.sample_rate(),
            scales: engine.config().scales,
        };
        Self {
            engine: Arc::new(Mutex::new(engine)),
            voice: Arc::new(voice),
            config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voices: Vec<String>,
    pub default_voice: String,
    pub sample_rate: u32,
    pub scales: ControlScales,
}

#[derive(Deserialize)]
pub struct TtsRequest {
    text: String,
    speed: Option<f32>,
    pitch: Option<f32>,
    glottal: Option<f32>,
}

#[derive(Serialize)]
pub struct TtsResponse {
    audio_base64: String,
    sample_rate: u32,
    duration_ms: u64,
    samples: usize,
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/voices", get(list_voices))
        .route("/tts", post(tts_endpoint));

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let Some(allowed_origins) = config.cors_allowed_origins.as_ref() else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(tower_http::cors::Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices(State(state): State<AppState>) -> Json<VoiceInfo> {
    Json(state.voice.as_ref().clone())
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, ApiError> {
    validate_tts_request(&req.text, state.config.max_text_length)?;
    validate_scale("speed", req.speed)?;
    validate_scale("pitch", req.pitch)?;
    validate_scale("glottal", req.glottal)?;

    let scales = state.voice.scales.with_overrides(req.speed, req.pitch, req.glottal);

    let queued_at = Instant::now();
    let mut engine = state.engine.clone().lock_owned().await;
    let waited = queued_at.elapsed();

    // Model runs block for the whole sentence; keep them off the async workers.
    let text = req.text.clone();
    let artifact = tokio::task::spawn_blocking(move || {
        engine.text_to_speech_blocking(&text, Some(scales))
    })
    .await
    .map_err(|join_err| {
        error!("TTS task join error: {join_err}");
        ApiError::Internal(format!("TTS task failed: {join_err}"))
    })??;

    let audio_base64 = artifact.to_wav_base64()?;
    info!(
        "TTS request: {} chars -> {}ms audio (queued {}ms, total {}ms)",
        req.text.chars().count(),
        artifact.duration_ms(),
        waited.as_millis(),
        queued_at.elapsed().as_millis()
    );

    Ok(Json(TtsResponse {
        audio_base64,
        sample_rate: artifact.sample_rate(),
        duration_ms: artifact.duration_ms(),
        samples: artifact.len(),
    }))
}
