//! Model-facing side of synthesis: per-sentence input tensors and the
//! steppable session contract the pipeline drives.
//!
//! A session is driven in this order for every sentence:
//! `set_inputs` → `schedule` → `step_execution` until it returns `false`
//! → `peek_output` → `release_inputs`. Backends decide how much work one
//! step performs; the pipeline only relies on the boolean continuation.

use std::ops::Deref;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Prosody knobs packed, in this order, into the model's `[3]` scales input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlScales {
    pub speed: f32,
    pub pitch: f32,
    pub glottal: f32,
}

impl Default for ControlScales {
    fn default() -> Self {
        Self {
            speed: 0.667,
            pitch: 1.0,
            glottal: 0.8,
        }
    }
}

impl ControlScales {
    pub fn new(speed: f32, pitch: f32, glottal: f32) -> Self {
        Self { speed, pitch, glottal }
    }

    pub fn as_array(&self) -> [f32; 3] {
        [self.speed, self.pitch, self.glottal]
    }

    /// Replace any of the three values, keeping the rest.
    pub fn with_overrides(self, speed: Option<f32>, pitch: Option<f32>, glottal: Option<f32>) -> Self {
        Self {
            speed: speed.unwrap_or(self.speed),
            pitch: pitch.unwrap_or(self.pitch),
            glottal: glottal.unwrap_or(self.glottal),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("speed", self.speed), ("pitch", self.pitch), ("glottal", self.glottal)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(TtsError::Config(format!(
                    "{name} scale must be a positive finite number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Inputs for exactly one inference call.
///
/// Owned by the session between `set_inputs` and `release_inputs`; never
/// reused across sentences.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    phoneme_ids: Array2<i64>,
    lengths: Array1<i64>,
    scales: Array1<f32>,
}

impl InferenceRequest {
    /// Shapes: ids `[1, N]`, lengths `[1]`, scales `[3]`.
    pub fn new(phoneme_ids: &[i64], length: usize, scales: ControlScales) -> Result<Self> {
        if length != phoneme_ids.len() {
            return Err(TtsError::shape(
                "input_lengths",
                format!("[{}]", phoneme_ids.len()),
                format!("[{length}]"),
            ));
        }
        let n = phoneme_ids.len();
        let phoneme_ids = Array2::from_shape_vec((1, n), phoneme_ids.to_vec())
            .map_err(|e| TtsError::shape("input", format!("[1, {n}]"), e))?;

        Ok(Self {
            phoneme_ids,
            lengths: Array1::from_vec(vec![n as i64]),
            scales: Array1::from_vec(scales.as_array().to_vec()),
        })
    }

    pub fn phoneme_ids(&self) -> &Array2<i64> {
        &self.phoneme_ids
    }

    pub fn lengths(&self) -> &Array1<i64> {
        &self.lengths
    }

    pub fn scales(&self) -> &Array1<f32> {
        &self.scales
    }

    /// Number of phoneme ids (N).
    pub fn len(&self) -> usize {
        self.phoneme_ids.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the three tensors over to a backend.
    pub fn into_parts(self) -> (Array2<i64>, Array1<i64>, Array1<f32>) {
        (self.phoneme_ids, self.lengths, self.scales)
    }
}

/// Samples produced by one sentence's inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformChunk(Vec<f32>);

impl WaveformChunk {
    pub fn new(samples: Vec<f32>) -> Self {
        Self(samples)
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for WaveformChunk {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for WaveformChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self(samples)
    }
}

/// A loaded model plus its execution context.
pub trait InferenceSession {
    /// Bind ids, lengths and scales positionally (input 0, 1, 2).
    /// Shape problems must be reported here, not during execution.
    fn set_inputs(&mut self, request: InferenceRequest) -> Result<()>;

    /// Begin execution of the bound inputs. Returns immediately.
    fn schedule(&mut self) -> Result<()>;

    /// Advance execution by one unit of work. `true` while work remains.
    fn step_execution(&mut self) -> Result<bool>;

    /// Read the output waveform. `NotReady` until `step_execution` has
    /// returned `false`.
    fn peek_output(&self) -> Result<WaveformChunk>;

    /// Drop bound inputs and any pending output. Safe to call in any state.
    fn release_inputs(&mut self);

    /// Blocking mode: schedule and step until done.
    fn run_to_completion(&mut self) -> Result<()> {
        self.schedule()?;
        while self.step_execution()? {}
        Ok(())
    }
}

impl<S: InferenceSession + ?Sized> InferenceSession for Box<S> {
    fn set_inputs(&mut self, request: InferenceRequest) -> Result<()> {
        (**self).set_inputs(request)
    }

    fn schedule(&mut self) -> Result<()> {
        (**self).schedule()
    }

    fn step_execution(&mut self) -> Result<bool> {
        (**self).step_execution()
    }

    fn peek_output(&self) -> Result<WaveformChunk> {
        (**self).peek_output()
    }

    fn release_inputs(&mut self) {
        (**self).release_inputs()
    }

    fn run_to_completion(&mut self) -> Result<()> {
        (**self).run_to_completion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes() {
        let req = InferenceRequest::new(&[1, 5, 9], 3, ControlScales::default()).unwrap();
        assert_eq!(req.phoneme_ids().shape(), &[1, 3]);
        assert_eq!(req.lengths().as_slice().unwrap(), &[3]);
        assert_eq!(req.scales().as_slice().unwrap(), &[0.667, 1.0, 0.8]);
    }

    #[test]
    fn test_request_empty_ids() {
        let req = InferenceRequest::new(&[], 0, ControlScales::default()).unwrap();
        assert!(req.is_empty());
        assert_eq!(req.phoneme_ids().shape(), &[1, 0]);
    }

    #[test]
    fn test_request_length_mismatch() {
        let result = InferenceRequest::new(&[1, 2], 3, ControlScales::default());
        assert!(matches!(
            result,
            Err(TtsError::ShapeMismatch { input: "input_lengths", .. })
        ));
    }

    #[test]
    fn test_scales_validate() {
        assert!(ControlScales::default().validate().is_ok());
        assert!(ControlScales::new(0.0, 1.0, 1.0).validate().is_err());
        assert!(ControlScales::new(1.0, f32::NAN, 1.0).validate().is_err());

        let s = ControlScales::default().with_overrides(None, Some(1.3), None);
        assert_eq!(s.as_array(), [0.667, 1.3, 0.8]);
    }
}
