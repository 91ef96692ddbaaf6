//! Silero VAD segmentation feeding Whisper transcription.

use std::time::Instant;

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Shortest utterance worth transcribing, in seconds.
const MIN_SPEECH_DURATION: f32 = 0.25;

/// Longest single segment, in seconds. Spoken commands are short.
const MAX_SPEECH_DURATION: f32 = 20.0;

/// 512 samples = 32ms at 16kHz.
const VAD_WINDOW_SIZE: i32 = 512;

const VAD_BUFFER_SIZE_SECONDS: f32 = 30.0;

/// Completed segments waiting for transcription.
const SEGMENT_QUEUE: usize = 4;

struct VadState {
    vad: SileroVad,
    speech_start: Option<Instant>,
}

/// Speech recognizer.
///
/// VAD and Whisper sit behind separate locks: the audio thread only ever
/// touches the VAD, so a slow transcription never stalls capture.
pub struct Recognizer {
    vad: Mutex<VadState>,
    whisper: Mutex<WhisperRecognizer>,
    segment_tx: mpsc::Sender<Vec<f32>>,
    sample_rate: u32,
}

impl Recognizer {
    /// Load the VAD and Whisper models.
    ///
    /// Returns the recognizer and the receiver of completed speech segments.
    ///
    /// # Errors
    /// Returns an error if either model fails to load.
    pub fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<Vec<f32>>)> {
        let provider = config.effective_stt_provider();
        info!("Loading speech recognition models ({} provider)", provider);

        let vad = SileroVad::new(
            SileroVadConfig {
                model: config.vad_model_path().to_string_lossy().to_string(),
                threshold: config.vad_threshold,
                sample_rate: config.sample_rate,
                min_silence_duration: config.vad_silence_duration,
                min_speech_duration: MIN_SPEECH_DURATION,
                max_speech_duration: MAX_SPEECH_DURATION,
                window_size: VAD_WINDOW_SIZE,
                provider: Some(provider.as_sherpa_provider().to_string()),
                num_threads: Some(config.vad_threads.try_into().unwrap_or(1)),
                debug: config.debug,
            },
            VAD_BUFFER_SIZE_SECONDS,
        )
        .map_err(|e| anyhow!("Failed to initialize Silero VAD: {}", e))?;

        let whisper = WhisperRecognizer::new(WhisperConfig {
            encoder: config.whisper_encoder_path().to_string_lossy().to_string(),
            decoder: config.whisper_decoder_path().to_string_lossy().to_string(),
            tokens: config.whisper_tokens_path().to_string_lossy().to_string(),
            language: config.effective_stt_language().to_string(),
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.stt_threads.try_into().unwrap_or(2)),
            debug: config.debug,
            ..Default::default()
        })
        .map_err(|e| anyhow!("Failed to initialize Whisper: {}", e))?;

        info!("Speech recognition ready");
        let (segment_tx, segment_rx) = mpsc::channel(SEGMENT_QUEUE);
        let recognizer = Self {
            vad: Mutex::new(VadState { vad, speech_start: None }),
            whisper: Mutex::new(whisper),
            segment_tx,
            sample_rate: config.sample_rate,
        };
        Ok((recognizer, segment_rx))
    }

    /// Feed microphone samples to the VAD. Called from the capture thread;
    /// completed segments are pushed to the segment channel without blocking.
    pub fn accept_waveform(&self, samples: &[f32]) {
        let mut state = self.vad.lock();
        state.vad.accept_waveform(samples.to_vec());

        let is_speech = state.vad.is_speech();
        match (is_speech, state.speech_start) {
            (true, None) => {
                state.speech_start = Some(Instant::now());
                debug!("🎤 Speech started");
            }
            (false, Some(start)) => {
                state.speech_start = None;
                debug!("🎤 Speech ended ({:.1}s)", start.elapsed().as_secs_f32());
            }
            _ => {}
        }

        if state.vad.is_empty() {
            return;
        }
        let segment = state.vad.front();
        state.vad.pop();
        drop(state);

        if !segment.samples.is_empty()
            && let Err(e) = self.segment_tx.try_send(segment.samples)
        {
            warn!("Dropped speech segment: {}", e);
        }
    }

    /// Transcribe one segment. Returns `None` for silence or empty output.
    pub fn transcribe(&self, samples: &[f32]) -> Option<String> {
        if samples.is_empty() {
            return None;
        }
        let started = Instant::now();
        let result = self.whisper.lock().transcribe(self.sample_rate, samples);
        let text = result.text.trim().to_string();
        debug!("Transcribed {} samples in {:.2}s", samples.len(), started.elapsed().as_secs_f32());

        if text.is_empty() {
            return None;
        }
        info!("🗣️ Heard: {}", text);
        Some(text)
    }
}
