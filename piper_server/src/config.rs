// Configuration for the HTTP host

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Path to the voice's `.onnx` model.
    pub model_path: Option<PathBuf>,
    /// Path to the voice's `.onnx.json`; defaults to `<model_path>.json`.
    pub voice_config_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_text_length: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            model_path: None,
            voice_config_path: None,
            request_timeout_secs: 60,
            max_text_length: 5000,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let model_path = std::env::var("PIPER_MODEL").ok().map(PathBuf::from);
        let voice_config_path = std::env::var("PIPER_VOICE_CONFIG").ok().map(PathBuf::from);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let max_text_length = std::env::var("MAX_TEXT_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_text_length);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port,
            model_path,
            voice_config_path,
            request_timeout_secs,
            max_text_length,
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Explicit voice config path, or the model path with `.json` appended
    /// (`voice.onnx` -> `voice.onnx.json`).
    pub fn resolved_voice_config_path(&self) -> Option<PathBuf> {
        self.voice_config_path.clone().or_else(|| {
            self.model_path.as_ref().map(|model| {
                let mut path = model.clone().into_os_string();
                path.push(".json");
                PathBuf::from(path)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_config_path_defaults_next_to_model() {
        let config = ServerConfig {
            model_path: Some(PathBuf::from("models/en_US-lessac-medium.onnx")),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.resolved_voice_config_path(),
            Some(PathBuf::from("models/en_US-lessac-medium.onnx.json"))
        );
    }

    #[test]
    fn test_explicit_voice_config_path_wins() {
        let config = ServerConfig {
            model_path: Some(PathBuf::from("a.onnx")),
            voice_config_path: Some(PathBuf::from("b.json")),
            ..ServerConfig::default()
        };
        assert_eq!(config.resolved_voice_config_path(), Some(PathBuf::from("b.json")));
        assert_eq!(ServerConfig::default().resolved_voice_config_path(), None);
    }
}
