//! Sentence-by-sentence synthesis with cooperative stepping.
//!
//! [`SynthesisTask`] is an explicit state machine: each call to
//! [`SynthesisTask::step`] does work until the session reports that more
//! work remains, then hands control back to the caller with
//! [`Progress::Pending`]. A host loop can interleave its own periodic work
//! between steps without a worker thread. [`SynthesisPipeline::synthesize`]
//! is the same loop on a tokio runtime, yielding to other tasks between
//! steps.

use std::{mem, time::Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, TtsError};
use crate::phonemize::{PhonemeResult, Sentence};
use crate::session::{ControlScales, InferenceRequest, InferenceSession, WaveformChunk};

/// Concatenated samples of every sentence, in sentence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    chunk_lengths: Vec<usize>,
}

impl Waveform {
    fn append(&mut self, chunk: WaveformChunk) {
        let samples = chunk.into_samples();
        self.chunk_lengths.push(samples.len());
        self.samples.extend(samples);
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample count contributed by each sentence.
    pub fn chunk_lengths(&self) -> &[usize] {
        &self.chunk_lengths
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

#[derive(Debug)]
pub enum Progress {
    /// The session has more work; call `step` again after yielding.
    Pending,
    Ready(Waveform),
}

/// Owns one inference session and runs phoneme results through it.
#[derive(Debug)]
pub struct SynthesisPipeline<S> {
    session: S,
    max_steps_per_sentence: Option<usize>,
}

impl<S: InferenceSession> SynthesisPipeline<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            max_steps_per_sentence: None,
        }
    }

    /// Abort a sentence whose inference needs more than `max` step calls.
    /// `None` (the default) and `Some(0)` never abort.
    pub fn with_max_steps(mut self, max: Option<usize>) -> Self {
        self.max_steps_per_sentence = max.filter(|&n| n > 0);
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Start a synthesis call. Nothing runs until the first `step`.
    pub fn begin<'a>(
        &'a mut self,
        phonemes: &'a PhonemeResult,
        scales: ControlScales,
    ) -> SynthesisTask<'a, S> {
        SynthesisTask {
            session: &mut self.session,
            sentences: phonemes.sentences(),
            scales,
            max_steps: self.max_steps_per_sentence,
            index: 0,
            state: TaskState::Next,
            waveform: Waveform::default(),
            started: Instant::now(),
        }
    }

    /// Drive a task to completion, yielding to the runtime between steps.
    pub async fn synthesize(
        &mut self,
        phonemes: &PhonemeResult,
        scales: ControlScales,
    ) -> Result<Waveform> {
        let mut task = self.begin(phonemes, scales);
        loop {
            match task.step()? {
                Progress::Pending => tokio::task::yield_now().await,
                Progress::Ready(waveform) => return Ok(waveform),
            }
        }
    }

    /// Drive a task to completion without yielding.
    pub fn synthesize_blocking(
        &mut self,
        phonemes: &PhonemeResult,
        scales: ControlScales,
    ) -> Result<Waveform> {
        let mut task = self.begin(phonemes, scales);
        loop {
            if let Progress::Ready(waveform) = task.step()? {
                return Ok(waveform);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    /// No inputs bound; start sentence `index` (or finish).
    Next,
    /// Inputs bound and scheduled; `steps` step calls made so far.
    Running { steps: usize },
    Finished,
}

/// One in-flight synthesis call over a borrowed session.
///
/// Dropping the task while a sentence is running releases the session's
/// bound inputs; the partial waveform is discarded.
pub struct SynthesisTask<'a, S: InferenceSession> {
    session: &'a mut S,
    sentences: &'a [Sentence],
    scales: ControlScales,
    max_steps: Option<usize>,
    index: usize,
    state: TaskState,
    waveform: Waveform,
    started: Instant,
}

impl<S: InferenceSession> SynthesisTask<'_, S> {
    /// Index of the sentence being (or about to be) synthesized.
    pub fn sentence_index(&self) -> usize {
        self.index
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Finished
    }

    /// Advance the synthesis. Returns `Pending` exactly once for every
    /// `step_execution` call that reported remaining work.
    pub fn step(&mut self) -> Result<Progress> {
        loop {
            match self.state {
                TaskState::Finished => return Err(TtsError::TaskFinished),
                TaskState::Next => {
                    if self.index == self.sentences.len() {
                        self.state = TaskState::Finished;
                        let waveform = mem::take(&mut self.waveform);
                        info!(
                            "Synthesized {} sentence(s), {} samples in {:.2}s",
                            self.sentences.len(),
                            waveform.len(),
                            self.started.elapsed().as_secs_f64()
                        );
                        return Ok(Progress::Ready(waveform));
                    }
                    if let Err(e) = self.start_sentence() {
                        return Err(self.abort(e));
                    }
                    self.state = TaskState::Running { steps: 0 };
                }
                TaskState::Running { steps } => {
                    let steps = steps + 1;
                    match self.session.step_execution() {
                        Ok(true) => {
                            if self.max_steps.is_some_and(|max| steps >= max) {
                                return Err(self.abort(TtsError::StepLimitExceeded { steps }));
                            }
                            self.state = TaskState::Running { steps };
                            return Ok(Progress::Pending);
                        }
                        Ok(false) => {
                            if let Err(e) = self.finish_sentence(steps) {
                                return Err(self.abort(e));
                            }
                            self.index += 1;
                            self.state = TaskState::Next;
                        }
                        Err(e) => return Err(self.abort(e)),
                    }
                }
            }
        }
    }

    fn start_sentence(&mut self) -> Result<()> {
        let ids = self.sentences[self.index].phoneme_ids();
        let request = InferenceRequest::new(ids, ids.len(), self.scales)?;
        self.session.set_inputs(request)?;
        self.session.schedule()
    }

    fn finish_sentence(&mut self, steps: usize) -> Result<()> {
        let chunk = self.session.peek_output();
        self.session.release_inputs();
        let chunk = chunk?;
        debug!(
            "Sentence {}/{}: {} ids -> {} samples ({} steps)",
            self.index + 1,
            self.sentences.len(),
            self.sentences[self.index].len(),
            chunk.len(),
            steps
        );
        self.waveform.append(chunk);
        Ok(())
    }

    fn abort(&mut self, cause: TtsError) -> TtsError {
        self.session.release_inputs();
        self.waveform = Waveform::default();
        self.state = TaskState::Finished;
        warn!("Synthesis aborted at sentence {}: {}", self.index, cause);
        TtsError::Synthesis {
            sentence: self.index,
            source: Box::new(cause),
        }
    }
}

impl<S: InferenceSession> Drop for SynthesisTask<'_, S> {
    fn drop(&mut self) {
        if let TaskState::Running { .. } = self.state {
            debug!("Synthesis cancelled during sentence {}", self.index);
            self.session.release_inputs();
        }
    }
}
