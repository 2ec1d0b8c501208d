use std::net::SocketAddr;

use piper_core::{SynthConfig, TtsEngine};
use piper_server::{build_router, config::ServerConfig, AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting Piper TTS server...");

    let config = ServerConfig::from_env();
    let model_path = config
        .model_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("PIPER_MODEL is not set (path to the voice .onnx file)"))?;
    let voice_config_path = config
        .resolved_voice_config_path()
        .ok_or_else(|| anyhow::anyhow!("PIPER_VOICE_CONFIG could not be resolved"))?;

    info!("Loading voice model {}", model_path.display());
    let engine = TtsEngine::from_voice_files(&model_path, &voice_config_path, SynthConfig::from_env())?;

    info!(
        "Server configuration loaded: port={}, request_timeout={}s, max_text_length={}",
        config.port, config.request_timeout_secs, config.max_text_length
    );
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let app = build_router(AppState::new(engine, config));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
