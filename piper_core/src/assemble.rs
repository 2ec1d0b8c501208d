use std::io::Cursor;

use base64::Engine;

use crate::error::{Result, TtsError};

/// Mono samples tagged with a sample rate, ready for playback or encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Wrap concatenated samples with a sample rate. Samples pass through
/// verbatim (no resampling or normalization).
pub fn assemble(samples: Vec<f32>, sample_rate: u32) -> Result<AudioArtifact> {
    if sample_rate == 0 {
        return Err(TtsError::InvalidSampleRate(sample_rate));
    }
    Ok(AudioArtifact {
        samples,
        sample_rate,
    })
}

impl AudioArtifact {
    pub const CHANNELS: u16 = 1;

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        Self::CHANNELS
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// 16-bit PCM mono WAV.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: Self::CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        // WAV header (44 bytes) + 2 bytes per sample
        let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            const I16_MAX_F32: f32 = i16::MAX as f32;
            for &s in &self.samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    pub fn to_wav_base64(&self) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_wav_bytes()?))
    }
}
