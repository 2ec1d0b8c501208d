// Synthesis settings shared by every call on one engine

use serde::{Deserialize, Serialize};

use crate::session::ControlScales;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub scales: ControlScales,
    pub voice: String,
    /// Upper bound on step calls per sentence; `None` never aborts.
    pub max_steps_per_sentence: Option<usize>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            scales: ControlScales::default(),
            voice: "en-us".to_string(),
            max_steps_per_sentence: None,
        }
    }
}

impl SynthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let sample_rate = env_parse("PIPER_SAMPLE_RATE")
            .filter(|rate: &u32| *rate > 0)
            .unwrap_or(defaults.sample_rate);

        let scales = ControlScales {
            speed: env_parse("PIPER_SCALE_SPEED").unwrap_or(defaults.scales.speed),
            pitch: env_parse("PIPER_SCALE_PITCH").unwrap_or(defaults.scales.pitch),
            glottal: env_parse("PIPER_SCALE_GLOTTAL").unwrap_or(defaults.scales.glottal),
        };

        let voice = std::env::var("PIPER_VOICE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.voice);

        let max_steps_per_sentence = env_parse("PIPER_MAX_STEPS").filter(|n: &usize| *n > 0);

        Self {
            sample_rate,
            scales,
            voice,
            max_steps_per_sentence,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
