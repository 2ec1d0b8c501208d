//! Deterministic doubles for exercising the pipeline without a model.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, TtsError};
use crate::phonemize::{AudioSection, EspeakSection, IdMapPhonemizer, VoiceConfig};
use crate::session::{ControlScales, InferenceRequest, InferenceSession, WaveformChunk};
use crate::{SynthConfig, TtsEngine};

/// Call counters recorded by [`ScriptedSession`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub set_inputs_calls: usize,
    pub schedule_calls: usize,
    pub step_calls: usize,
    pub releases: usize,
    /// Inputs currently held by the session.
    pub bound: bool,
}

#[derive(Debug)]
enum ScriptState {
    Idle,
    Bound(InferenceRequest),
    Scheduled { request: InferenceRequest, steps: usize },
    Complete(Vec<f32>),
}

/// Fake session whose runs take a fixed number of step calls and whose
/// output is a pure function of ids and scales.
///
/// Every id contributes `samples_per_id` samples, so chunk length depends
/// only on the number of ids.
#[derive(Debug)]
pub struct ScriptedSession {
    steps_per_run: usize,
    samples_per_id: usize,
    fail_set_inputs_on: Option<usize>,
    fail_step_on: Option<usize>,
    fail_output_on: Option<usize>,
    step_delay: Option<Duration>,
    stall: bool,
    state: ScriptState,
    stats: SessionStats,
}

impl ScriptedSession {
    /// Runs complete on the `steps_per_run`-th step call (minimum 1).
    pub fn new(steps_per_run: usize) -> Self {
        Self {
            steps_per_run: steps_per_run.max(1),
            samples_per_id: 4,
            fail_set_inputs_on: None,
            fail_step_on: None,
            fail_output_on: None,
            step_delay: None,
            stall: false,
            state: ScriptState::Idle,
            stats: SessionStats::default(),
        }
    }

    pub fn with_samples_per_id(mut self, n: usize) -> Self {
        self.samples_per_id = n;
        self
    }

    /// Reject the `call`-th (0-based) `set_inputs` with a shape mismatch.
    pub fn fail_set_inputs_on(mut self, call: usize) -> Self {
        self.fail_set_inputs_on = Some(call);
        self
    }

    /// Fail the `call`-th (0-based, counted across runs) `step_execution`.
    pub fn fail_step_on(mut self, call: usize) -> Self {
        self.fail_step_on = Some(call);
        self
    }

    /// Refuse to hand out the output of the `run`-th (0-based) run.
    pub fn fail_output_on(mut self, run: usize) -> Self {
        self.fail_output_on = Some(run);
        self
    }

    /// Block the calling thread for `delay` on every step, like a real
    /// model run would.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Never report completion.
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// The chunk this session produces for `ids` under `scales`.
    pub fn expected_output(&self, ids: &[i64], scales: ControlScales) -> Vec<f32> {
        render(ids, scales, self.samples_per_id)
    }
}

fn render(ids: &[i64], scales: ControlScales, samples_per_id: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(ids.len() * samples_per_id);
    for &id in ids {
        for k in 0..samples_per_id {
            let base = id as f32 * 0.01 + k as f32 * 0.001;
            out.push(base * scales.pitch * scales.speed + scales.glottal * 0.001);
        }
    }
    out
}

impl InferenceSession for ScriptedSession {
    fn set_inputs(&mut self, request: InferenceRequest) -> Result<()> {
        let call = self.stats.set_inputs_calls;
        self.stats.set_inputs_calls += 1;
        if self.fail_set_inputs_on == Some(call) {
            return Err(TtsError::ShapeMismatch {
                input: "input",
                expected: "[1, N]".to_string(),
                actual: "scripted failure".to_string(),
            });
        }
        self.state = ScriptState::Bound(request);
        self.stats.bound = true;
        Ok(())
    }

    fn schedule(&mut self) -> Result<()> {
        self.stats.schedule_calls += 1;
        match std::mem::replace(&mut self.state, ScriptState::Idle) {
            ScriptState::Bound(request) => {
                self.state = ScriptState::Scheduled { request, steps: 0 };
                Ok(())
            }
            other => {
                self.state = other;
                Err(TtsError::SessionState("schedule called without bound inputs"))
            }
        }
    }

    fn step_execution(&mut self) -> Result<bool> {
        let call = self.stats.step_calls;
        self.stats.step_calls += 1;
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        if self.fail_step_on == Some(call) {
            return Err(TtsError::SessionState("scripted step failure"));
        }
        match std::mem::replace(&mut self.state, ScriptState::Idle) {
            ScriptState::Scheduled { request, steps } => {
                let steps = steps + 1;
                if self.stall || steps < self.steps_per_run {
                    self.state = ScriptState::Scheduled { request, steps };
                    return Ok(true);
                }
                let ids: Vec<i64> = request.phoneme_ids().iter().copied().collect();
                let scales = request.scales();
                let scales = ControlScales::new(scales[0], scales[1], scales[2]);
                self.state = ScriptState::Complete(render(&ids, scales, self.samples_per_id));
                Ok(false)
            }
            ScriptState::Complete(samples) => {
                self.state = ScriptState::Complete(samples);
                Ok(false)
            }
            other => {
                self.state = other;
                Err(TtsError::SessionState("step_execution called before schedule"))
            }
        }
    }

    fn peek_output(&self) -> Result<WaveformChunk> {
        match &self.state {
            ScriptState::Complete(_)
                if self.fail_output_on.is_some_and(|run| run + 1 == self.stats.set_inputs_calls) =>
            {
                Err(TtsError::SessionState("scripted output failure"))
            }
            ScriptState::Complete(samples) => Ok(WaveformChunk::new(samples.clone())),
            _ => Err(TtsError::NotReady),
        }
    }

    fn release_inputs(&mut self) {
        self.stats.releases += 1;
        self.stats.bound = false;
        self.state = ScriptState::Idle;
    }
}

/// Voice config for voice id `en-us` mapping ASCII letters, digits, space
/// and basic punctuation to distinct ids.
pub fn ascii_voice_config() -> VoiceConfig {
    let mut phoneme_id_map: HashMap<char, Vec<i64>> = HashMap::new();
    for (id, c) in ['_', '^', '$'].into_iter().enumerate() {
        phoneme_id_map.insert(c, vec![id as i64]);
    }
    let symbols = (' '..='~').filter(|c| !matches!(*c, '_' | '^' | '$'));
    for (i, c) in symbols.enumerate() {
        phoneme_id_map.insert(c, vec![i as i64 + 3]);
    }

    VoiceConfig {
        audio: AudioSection {
            sample_rate: 16000,
            quality: None,
        },
        espeak: EspeakSection {
            voice: "en-us".to_string(),
        },
        inference: None,
        phoneme_id_map,
    }
}

/// Engine over [`ascii_voice_config`] and a [`ScriptedSession`].
pub fn scripted_engine(session: ScriptedSession) -> Result<TtsEngine> {
    let voice = ascii_voice_config();
    let phonemizer = IdMapPhonemizer::new(&voice)?;
    let config = SynthConfig {
        sample_rate: voice.audio.sample_rate,
        ..SynthConfig::default()
    };
    Ok(TtsEngine::new(Box::new(phonemizer), Box::new(session), config))
}
