use thiserror::Error;

pub type Result<T> = std::result::Result<T, TtsError>;

/// Failures surfaced by phonemization, inference and assembly.
#[derive(Debug, Error)]
pub enum TtsError {
    /// Unknown voice, or text that yields no phoneme ids.
    #[error("Phonemization error: {0}")]
    Phonemization(String),

    /// Input tensors do not match the shapes the model contract expects.
    #[error("Shape mismatch for input `{input}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        input: &'static str,
        expected: String,
        actual: String,
    },

    /// Output was read before execution completed.
    #[error("Inference output requested before execution completed")]
    NotReady,

    /// Session API called out of order (e.g. schedule without inputs).
    #[error("Invalid session state: {0}")]
    SessionState(&'static str),

    #[error("Inference did not complete within {steps} steps")]
    StepLimitExceeded { steps: usize },

    /// Any per-sentence failure; the whole synthesis call is aborted.
    #[error("Synthesis failed at sentence {sentence}: {source}")]
    Synthesis {
        sentence: usize,
        #[source]
        source: Box<TtsError>,
    },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Synthesis task already finished")]
    TaskFinished,

    #[error("Inference runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TtsError {
    pub(crate) fn shape(input: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        TtsError::ShapeMismatch {
            input,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// The innermost cause, looking through `Synthesis` wrappers.
    pub fn root_cause(&self) -> &TtsError {
        match self {
            TtsError::Synthesis { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the caller's input (text or voice) is at fault rather than
    /// the runtime or the model contract.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.root_cause(),
            TtsError::Phonemization(_) | TtsError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_synthesis() {
        let err = TtsError::Synthesis {
            sentence: 1,
            source: Box::new(TtsError::shape("scales", "[3]", "[2]")),
        };
        assert!(matches!(err.root_cause(), TtsError::ShapeMismatch { input: "scales", .. }));
        assert!(!err.is_caller_error());
        assert!(err.to_string().contains("sentence 1"));
    }

    #[test]
    fn test_phonemization_is_caller_error() {
        let err = TtsError::Phonemization("unknown voice 'xx'".to_string());
        assert!(err.is_caller_error());
    }
}
