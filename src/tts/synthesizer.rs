//! Kokoro text-to-speech.

use anyhow::{Result, anyhow};
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Kokoro always renders at 24kHz.
const KOKORO_SAMPLE_RATE: u32 = 24000;

pub struct Synthesizer {
    tts: KokoroTts,
    speaker_id: i32,
    speed: f32,
}

impl Synthesizer {
    /// Load the Kokoro voice.
    ///
    /// # Errors
    /// Returns an error if the model files cannot be loaded.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let provider = config.effective_tts_provider();
        info!("Loading Kokoro voice {} ({} provider)", config.tts_voice, provider);

        let tts = KokoroTts::new(KokoroTtsConfig {
            model: config.tts_model_path().to_string_lossy().to_string(),
            voices: config.tts_voices_path().to_string_lossy().to_string(),
            tokens: config.tts_tokens_path().to_string_lossy().to_string(),
            data_dir: config.tts_data_dir().to_string_lossy().to_string(),
            dict_dir: config.tts_dict_dir().to_string_lossy().to_string(),
            lexicon: config.tts_lexicon(),
            lang: config.tts_language().to_string(),
            length_scale: 1.0 / config.tts_speed,
            onnx_config: OnnxConfig {
                provider: provider.as_sherpa_provider().to_string(),
                num_threads: config.tts_threads.try_into().unwrap_or(2),
                debug: config.debug,
            },
            // Kokoro only supports one sentence per call
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() },
        });

        Ok(Self { tts, speaker_id: config.tts_speaker_id, speed: config.tts_speed })
    }

    /// Render one sentence.
    ///
    /// # Errors
    /// Returns an error if generation fails.
    pub fn synthesize(&mut self, sentence: &str) -> Result<Vec<f32>> {
        if sentence.trim().is_empty() {
            return Ok(Vec::new());
        }
        let audio = self.tts.create(sentence, self.speaker_id, self.speed).map_err(|e| anyhow!("TTS generation failed: {}", e))?;
        debug!("🎵 \"{}\" -> {} samples", sentence, audio.samples.len());
        Ok(audio.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }
}

/// Drop emoji and markup that the voice would read out or stumble on.
pub fn speakable(text: &str) -> String {
    let kept: String = text
        .chars()
        .map(|c| match c {
            '*' | '`' | '#' | '_' | '|' | '>' => ' ',
            c if c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation() => c,
            _ => ' ',
        })
        .collect();
    kept.lines().map(|line| line.split_whitespace().collect::<Vec<_>>().join(" ")).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
}

/// Split text into sentences for streaming synthesis. A terminator only ends
/// a sentence when followed by whitespace, so `app.py` stays whole.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_trimmed(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | ';') && chars.peek().is_none_or(|next| next.is_whitespace()) {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}
