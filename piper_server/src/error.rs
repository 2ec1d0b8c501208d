use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use piper_core::TtsError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("TTS error: {0}")]
    Tts(#[from] TtsError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Tts(e) if e.is_caller_error() => {
                tracing::warn!("Rejected TTS input: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Tts(e) => {
                tracing::error!("TTS error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("TTS error: {}", e))
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
