//! Text → per-sentence phoneme ids.

use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TtsError};
use crate::session::ControlScales;

const BOS: char = '^';
const EOS: char = '$';
const PAD: char = '_';

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "etc.", "vs.", "e.g.", "i.e.", "a.m.", "p.m.", "Inc.",
    "Ltd.", "Corp.", "St.",
];

/// One sentence worth of phoneme ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sentence {
    phoneme_ids: Vec<i64>,
}

impl Sentence {
    pub fn new(phoneme_ids: Vec<i64>) -> Self {
        Self { phoneme_ids }
    }

    pub fn phoneme_ids(&self) -> &[i64] {
        &self.phoneme_ids
    }

    pub fn len(&self) -> usize {
        self.phoneme_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phoneme_ids.is_empty()
    }
}

/// Sentences in text order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhonemeResult {
    sentences: Vec<Sentence>,
}

impl PhonemeResult {
    pub fn new(sentences: Vec<Sentence>) -> Self {
        Self { sentences }
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

impl FromIterator<Vec<i64>> for PhonemeResult {
    fn from_iter<I: IntoIterator<Item = Vec<i64>>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Sentence::new).collect())
    }
}

pub trait Phonemizer {
    /// Split `text` into sentences and map each to phoneme ids for `voice`.
    fn phonemize(&self, text: &str, voice: &str) -> Result<PhonemeResult>;

    /// Voice identifiers this phonemizer accepts.
    fn voices(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioSection {
    pub sample_rate: u32,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EspeakSection {
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSection {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
}

/// The parts of a Piper `*.onnx.json` voice file used here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioSection,
    pub espeak: EspeakSection,
    #[serde(default)]
    pub inference: Option<InferenceSection>,
    pub phoneme_id_map: HashMap<char, Vec<i64>>,
}

impl VoiceConfig {
    pub fn from_path<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to read voice config {}", p.as_ref().display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Invalid voice config {}", p.as_ref().display()))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let config: VoiceConfig =
            serde_json::from_str(text).with_context(|| "voice config is not valid JSON")?;
        Ok(config)
    }

    /// Scales from the voice's `inference` block, positionally mapped onto
    /// the scales tensor.
    pub fn default_scales(&self) -> Option<ControlScales> {
        self.inference
            .as_ref()
            .map(|i| ControlScales::new(i.noise_scale, i.length_scale, i.noise_w))
    }
}

/// Maps each character of a sentence through the voice's phoneme id table.
///
/// Text must already be in the voice's symbol alphabet (IPA for espeak
/// voices, plain characters for text voices).
#[derive(Debug, Clone)]
pub struct IdMapPhonemizer {
    voice: String,
    id_map: HashMap<char, i64>,
    pad_id: i64,
    bos_id: i64,
    eos_id: i64,
}

impl IdMapPhonemizer {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let id_map: HashMap<char, i64> = config
            .phoneme_id_map
            .iter()
            .filter_map(|(c, ids)| ids.first().map(|id| (*c, *id)))
            .collect();

        let lookup = |c: char| {
            id_map.get(&c).copied().ok_or_else(|| {
                TtsError::Config(format!("phoneme_id_map has no entry for '{c}'"))
            })
        };
        let (pad_id, bos_id, eos_id) = (lookup(PAD)?, lookup(BOS)?, lookup(EOS)?);

        Ok(Self {
            voice: config.espeak.voice.clone(),
            id_map,
            pad_id,
            bos_id,
            eos_id,
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    fn sentence_ids(&self, sentence: &str) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity((sentence.len() + 2) * 2);
        ids.push(self.bos_id);
        ids.push(self.pad_id);

        let mut mapped = 0usize;
        let mut skipped = 0usize;
        for c in sentence.chars() {
            match self.id_map.get(&c) {
                Some(&id) => {
                    ids.push(id);
                    ids.push(self.pad_id);
                    if !c.is_whitespace() {
                        mapped += 1;
                    }
                }
                None if c.is_whitespace() => {}
                None => skipped += 1,
            }
        }

        if mapped == 0 && skipped > 0 {
            return Err(TtsError::Phonemization(format!(
                "sentence {sentence:?} cannot be tokenized for voice '{}'",
                self.voice
            )));
        }
        if skipped > 0 {
            warn!("Skipped {} unmapped symbol(s) in {:?}", skipped, sentence);
        }

        ids.push(self.eos_id);
        Ok(ids)
    }
}

impl Phonemizer for IdMapPhonemizer {
    fn phonemize(&self, text: &str, voice: &str) -> Result<PhonemeResult> {
        if voice != self.voice {
            return Err(TtsError::Phonemization(format!(
                "Unknown voice '{voice}'. Available voices: {}",
                self.voice
            )));
        }

        let sentences = split_sentences(text)
            .iter()
            .map(|s| self.sentence_ids(s).map(Sentence::new))
            .collect::<Result<Vec<_>>>()?;

        debug!("Phonemized {} chars into {} sentence(s)", text.len(), sentences.len());
        Ok(PhonemeResult::new(sentences))
    }

    fn voices(&self) -> Vec<String> {
        vec![self.voice.clone()]
    }
}

/// Split text into trimmed sentences at `.`, `!` and `?`.
///
/// A period ends a sentence unless it closes a known abbreviation or is
/// directly followed by a letter or digit ("3.14", "e.g."). Empty pieces
/// are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        let ends_sentence = match c {
            '!' | '?' => true,
            '.' => {
                // "3.50", "e.g" and "a.m" keep going: the next char is part of the word.
                let inside_word = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
                let is_abbrev = ABBREVIATIONS.iter().any(|a| ends_with_word(&current, a));
                !inside_word && !is_abbrev
            }
            _ => false,
        };

        if ends_sentence {
            // Keep runs like "?!" or "..." with the sentence they close.
            while i + 1 < chars.len() && matches!(chars[i + 1], '.' | '!' | '?') {
                i += 1;
                current.push(chars[i]);
            }
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
        i += 1;
    }
    push_trimmed(&mut sentences, &current);

    sentences
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// `text` ends with `word` and `word` starts at a word boundary.
fn ends_with_word(text: &str, word: &str) -> bool {
    if !text.ends_with(word) {
        return false;
    }
    let head = &text[..text.len() - word.len()];
    head.chars().last().map_or(true, |c| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_config() -> VoiceConfig {
        VoiceConfig::from_json_str(
            r#"{
                "audio": { "sample_rate": 16000 },
                "espeak": { "voice": "en-us" },
                "inference": { "noise_scale": 0.5, "length_scale": 1.1, "noise_w": 0.7 },
                "phoneme_id_map": {
                    "_": [0], "^": [1], "$": [2], " ": [3], ".": [4],
                    "a": [10], "b": [11], "c": [12]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("Hello there. How are you? Fine!");
        assert_eq!(s, vec!["Hello there.", "How are you?", "Fine!"]);
    }

    #[test]
    fn test_split_sentences_abbreviations_and_decimals() {
        let s = split_sentences("Dr. Smith paid 3.50 today. Done");
        assert_eq!(s, vec!["Dr. Smith paid 3.50 today.", "Done"]);
    }

    #[test]
    fn test_split_sentences_dotted_abbreviations() {
        let s = split_sentences("See e.g. this one. Then i.e. that one. Meet at 9 a.m. sharp.");
        assert_eq!(
            s,
            vec!["See e.g. this one.", "Then i.e. that one.", "Meet at 9 a.m. sharp."]
        );

        let s = split_sentences("Call after 5 p.m. Then rest.");
        assert_eq!(s, vec!["Call after 5 p.m. Then rest."]);
    }

    #[test]
    fn test_split_sentences_keeps_punctuation_runs() {
        let s = split_sentences("Really?! Yes...");
        assert_eq!(s, vec!["Really?!", "Yes..."]);
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn test_phonemize_ids_layout() {
        let p = IdMapPhonemizer::new(&voice_config()).unwrap();
        let result = p.phonemize("ab. c", "en-us").unwrap();
        assert_eq!(result.len(), 2);
        // ^ _ a _ b _ . _ $
        assert_eq!(result.sentences()[0].phoneme_ids(), &[1, 0, 10, 0, 11, 0, 4, 0, 2]);
        assert_eq!(result.sentences()[1].phoneme_ids(), &[1, 0, 12, 0, 2]);
    }

    #[test]
    fn test_phonemize_unknown_voice() {
        let p = IdMapPhonemizer::new(&voice_config()).unwrap();
        let err = p.phonemize("abc", "de-de").unwrap_err();
        assert!(matches!(err, TtsError::Phonemization(msg) if msg.contains("Unknown voice")));
    }

    #[test]
    fn test_phonemize_untokenizable_sentence() {
        let p = IdMapPhonemizer::new(&voice_config()).unwrap();
        assert!(matches!(
            p.phonemize("zzz", "en-us"),
            Err(TtsError::Phonemization(_))
        ));
    }

    #[test]
    fn test_phonemize_skips_unmapped_symbols() {
        let p = IdMapPhonemizer::new(&voice_config()).unwrap();
        let result = p.phonemize("axb", "en-us").unwrap();
        assert_eq!(result.sentences()[0].phoneme_ids(), &[1, 0, 10, 0, 11, 0, 2]);
    }

    #[test]
    fn test_phonemize_empty_text() {
        let p = IdMapPhonemizer::new(&voice_config()).unwrap();
        assert!(p.phonemize("", "en-us").unwrap().is_empty());
    }

    #[test]
    fn test_missing_meta_symbol() {
        let mut config = voice_config();
        config.phoneme_id_map.remove(&'$');
        assert!(matches!(IdMapPhonemizer::new(&config), Err(TtsError::Config(_))));
    }

    #[test]
    fn test_voice_default_scales() {
        let scales = voice_config().default_scales().unwrap();
        assert_eq!(scales.as_array(), [0.5, 1.1, 0.7]);
    }
}
