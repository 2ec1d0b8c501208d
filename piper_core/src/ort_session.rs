use std::{mem, path::Path, time::Instant};

use anyhow::Context;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tracing::{debug, info};

use crate::error::{Result, TtsError};
use crate::session::{InferenceRequest, InferenceSession, WaveformChunk};

enum ExecState {
    Idle,
    Bound(InferenceRequest),
    Scheduled(InferenceRequest),
    Complete(Vec<f32>),
}

/// ONNX Runtime backed session for a Piper/VITS voice model.
///
/// ONNX Runtime executes a graph atomically, so a scheduled run is a
/// single unit of work: the first `step_execution` performs it and
/// returns `false`.
pub struct OrtSession {
    session: Session,
    input_names: [String; 3],
    state: ExecState,
}

impl std::fmt::Debug for OrtSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtSession")
            .field("session", &"<ort::Session>")
            .field("input_names", &self.input_names)
            .finish()
    }
}

impl OrtSession {
    /// Load an `.onnx` model from disk.
    pub fn from_file<P: AsRef<Path>>(model_path: P) -> anyhow::Result<Self> {
        let path = model_path.as_ref();
        let started = Instant::now();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;
        let session = Self::from_session(session)?;
        info!(
            "Loaded model {} in {:.2}s (inputs: {})",
            path.display(),
            started.elapsed().as_secs_f64(),
            session.input_names.join(", ")
        );
        Ok(session)
    }

    /// Wrap an already-built session. The model must declare at least three
    /// inputs: ids, lengths and scales, in that order.
    pub fn from_session(session: Session) -> Result<Self> {
        if session.inputs.len() < 3 {
            return Err(TtsError::shape(
                "model inputs",
                "at least 3 (input, input_lengths, scales)",
                session.inputs.len(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(TtsError::shape("model outputs", "at least 1", 0));
        }
        let input_names = [
            session.inputs[0].name.clone(),
            session.inputs[1].name.clone(),
            session.inputs[2].name.clone(),
        ];
        Ok(Self {
            session,
            input_names,
            state: ExecState::Idle,
        })
    }

    pub fn input_names(&self) -> &[String; 3] {
        &self.input_names
    }

    fn run(&self, request: InferenceRequest) -> Result<Vec<f32>> {
        let started = Instant::now();
        let n = request.len();
        let (ids, lengths, scales) = request.into_parts();

        let outputs = self.session.run(ort::inputs![
            Tensor::from_array(ids)?,
            Tensor::from_array(lengths)?,
            Tensor::from_array(scales)?
        ]?)?;
        let audio = outputs[0].try_extract_tensor::<f32>()?;
        let samples: Vec<f32> = audio.iter().copied().collect();

        debug!(
            "Inference: {} ids -> {} samples in {}ms",
            n,
            samples.len(),
            started.elapsed().as_millis()
        );
        Ok(samples)
    }
}

impl InferenceSession for OrtSession {
    fn set_inputs(&mut self, request: InferenceRequest) -> Result<()> {
        let ids_shape = request.phoneme_ids().shape();
        if ids_shape[0] != 1 {
            return Err(TtsError::shape("input", "[1, N]", format!("{ids_shape:?}")));
        }
        if request.lengths().len() != 1 {
            return Err(TtsError::shape(
                "input_lengths",
                "[1]",
                format!("{:?}", request.lengths().shape()),
            ));
        }
        if request.scales().len() != 3 {
            return Err(TtsError::shape(
                "scales",
                "[3]",
                format!("{:?}", request.scales().shape()),
            ));
        }
        self.state = ExecState::Bound(request);
        Ok(())
    }

    fn schedule(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, ExecState::Idle) {
            ExecState::Bound(request) => {
                self.state = ExecState::Scheduled(request);
                Ok(())
            }
            other => {
                self.state = other;
                Err(TtsError::SessionState("schedule called without bound inputs"))
            }
        }
    }

    fn step_execution(&mut self) -> Result<bool> {
        match mem::replace(&mut self.state, ExecState::Idle) {
            ExecState::Scheduled(request) => {
                // On error the request is already consumed and the state stays Idle.
                let samples = self.run(request)?;
                self.state = ExecState::Complete(samples);
                Ok(false)
            }
            ExecState::Complete(samples) => {
                self.state = ExecState::Complete(samples);
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
            ExecState::Complete(samples) => Ok(WaveformChunk::new(samples.clone())),
            _ => Err(TtsError::NotReady),
        }
    }

    fn release_inputs(&mut self) {
        self.state = ExecState::Idle;
    }
}
