mod assemble;
pub mod config;
mod error;
mod ort_session;
pub mod phonemize;
pub mod pipeline;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::{path::Path, time::Instant};

use anyhow::Context;
use tracing::{debug, info};

pub use assemble::{assemble, AudioArtifact};
pub use config::SynthConfig;
pub use error::{Result, TtsError};
pub use ort_session::OrtSession;
pub use phonemize::{IdMapPhonemizer, PhonemeResult, Phonemizer, Sentence, VoiceConfig};
pub use pipeline::{Progress, SynthesisPipeline, SynthesisTask, Waveform};
pub use session::{ControlScales, InferenceRequest, InferenceSession, WaveformChunk};

pub type BoxedSession = Box<dyn InferenceSession + Send>;
pub type BoxedPhonemizer = Box<dyn Phonemizer + Send + Sync>;

/// Owns a phonemizer and a model session for the lifetime of a host.
///
/// Synthesis borrows the engine mutably, so one engine serves one call at
/// a time; hosts sharing an engine must serialize access themselves.
pub struct TtsEngine {
    phonemizer: BoxedPhonemizer,
    pipeline: SynthesisPipeline<BoxedSession>,
    config: SynthConfig,
}

// Manual Debug implementation since the boxed collaborators are opaque
impl std::fmt::Debug for TtsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsEngine")
            .field("phonemizer", &"<Phonemizer>")
            .field("session", &"<InferenceSession>")
            .field("config", &self.config)
            .finish()
    }
}

impl TtsEngine {
    pub fn new(phonemizer: BoxedPhonemizer, session: BoxedSession, config: SynthConfig) -> Self {
        let pipeline = SynthesisPipeline::new(session).with_max_steps(config.max_steps_per_sentence);
        Self {
            phonemizer,
            pipeline,
            config,
        }
    }

    /// Load an ONNX voice model and its `.onnx.json` config.
    ///
    /// The voice file decides the sample rate, the voice id and (when it has
    /// an `inference` block) the default scales; `config` supplies the rest.
    pub fn from_voice_files<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        voice_config_path: Q,
        mut config: SynthConfig,
    ) -> anyhow::Result<Self> {
        let voice = VoiceConfig::from_path(voice_config_path.as_ref())?;
        let phonemizer = IdMapPhonemizer::new(&voice).with_context(|| {
            format!("Unusable voice config {}", voice_config_path.as_ref().display())
        })?;
        let session = OrtSession::from_file(model_path.as_ref())?;

        config.sample_rate = voice.audio.sample_rate;
        config.voice = phonemizer.voice().to_string();
        if let Some(scales) = voice.default_scales() {
            config.scales = scales;
        }
        config.scales.validate()?;

        info!(
            "Voice '{}' ready: {} Hz, scales {:?}",
            config.voice, config.sample_rate, config.scales
        );
        Ok(Self::new(Box::new(phonemizer), Box::new(session), config))
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn voices(&self) -> Vec<String> {
        self.phonemizer.voices()
    }

    pub fn phonemize(&self, text: &str) -> Result<PhonemeResult> {
        self.phonemizer.phonemize(text, &self.config.voice)
    }

    fn resolve_scales(&self, scales: Option<ControlScales>) -> Result<ControlScales> {
        let scales = scales.unwrap_or(self.config.scales);
        scales.validate()?;
        Ok(scales)
    }

    /// Text in, playable audio out. Yields to the runtime between
    /// inference steps.
    pub async fn text_to_speech(
        &mut self,
        text: &str,
        scales: Option<ControlScales>,
    ) -> Result<AudioArtifact> {
        let started = Instant::now();
        let scales = self.resolve_scales(scales)?;
        let phonemes = self.phonemize(text)?;
        let waveform = self.pipeline.synthesize(&phonemes, scales).await?;
        let artifact = assemble(waveform.into_samples(), self.config.sample_rate)?;
        debug!(
            "text_to_speech: {} chars -> {}ms audio in {}ms",
            text.len(),
            artifact.duration_ms(),
            started.elapsed().as_millis()
        );
        Ok(artifact)
    }

    pub fn text_to_speech_blocking(
        &mut self,
        text: &str,
        scales: Option<ControlScales>,
    ) -> Result<AudioArtifact> {
        let scales = self.resolve_scales(scales)?;
        let phonemes = self.phonemize(text)?;
        let waveform = self.pipeline.synthesize_blocking(&phonemes, scales)?;
        assemble(waveform.into_samples(), self.config.sample_rate)
    }
}

impl Drop for TtsEngine {
    fn drop(&mut self) {
        debug!("Releasing TTS engine for voice '{}'", self.config.voice);
    }
}
