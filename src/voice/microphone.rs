//! Microphone and speaker voice.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Earcon, Gate, Heard, ListenMode, Voice, gate};
use crate::audio::util::{apply_gain, tone};
use crate::audio::{Capturer, Player};
use crate::config::AppConfig;
use crate::session::VoiceMode;
use crate::stt::Recognizer;
use crate::tts::{Synthesizer, speakable, split_sentences};

/// How long a command listen runs before handing control back to the daemon.
const COMMAND_WINDOW: Duration = Duration::from_secs(5);
const WHISPER_GAIN: f32 = 0.35;
const EARCON_VOLUME: f32 = 0.3;

pub struct MicrophoneVoice {
    capturer: Capturer,
    recognizer: Arc<Recognizer>,
    segments: mpsc::Receiver<Vec<f32>>,
    synthesizer: Arc<Mutex<Synthesizer>>,
    player: Arc<Player>,
    output_rate: u32,
    wake_word: Option<String>,
    mode: VoiceMode,
    follow_up_window: Duration,
    resume_delay: Duration,
}

impl MicrophoneVoice {
    /// Load the speech models and open the audio devices.
    ///
    /// # Errors
    /// Returns an error if a model file is missing, a model fails to load or
    /// no audio device is available.
    pub fn new(config: &AppConfig, wake_word_enabled: bool) -> Result<Self> {
        config.validate_voice()?;

        let (recognizer, segments) = Recognizer::new(config)?;
        let recognizer = Arc::new(recognizer);
        let synthesizer = Synthesizer::new(config)?;
        let output_rate = synthesizer.sample_rate();
        let player = Arc::new(Player::new(output_rate)?);

        let feed = recognizer.clone();
        let capturer = Capturer::new(config.sample_rate, move |samples: &[f32]| feed.accept_waveform(samples))?;
        capturer.resume();

        let wake_word = wake_word_enabled.then(|| config.wake_word.clone());
        info!("🎤 Microphone voice ready (wake word: {})", wake_word.as_deref().unwrap_or("off"));
        Ok(Self {
            capturer,
            recognizer,
            segments,
            synthesizer: Arc::new(Mutex::new(synthesizer)),
            player,
            output_rate,
            wake_word,
            mode: VoiceMode::Normal,
            follow_up_window: Duration::from_secs(config.follow_up_timeout_secs),
            resume_delay: Duration::from_millis(config.post_playback_delay_ms),
        })
    }

    async fn transcribe(&self, samples: Vec<f32>) -> Option<String> {
        let recognizer = self.recognizer.clone();
        match tokio::task::spawn_blocking(move || recognizer.transcribe(&samples)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Transcription task failed: {}", e);
                None
            }
        }
    }

    fn gain(&self) -> f32 {
        match self.mode {
            VoiceMode::Normal => 1.0,
            VoiceMode::Whisper => WHISPER_GAIN,
        }
    }

    /// Play a clip with the microphone paused, then drop anything it
    /// picked up meanwhile.
    async fn play(&mut self, clip: Vec<f32>) {
        self.capturer.pause();
        let player = self.player.clone();
        match tokio::task::spawn_blocking(move || player.play(&clip)).await {
            Ok(true) => {}
            Ok(false) => debug!("Playback cut short"),
            Err(e) => warn!("Playback task failed: {}", e),
        }
        tokio::time::sleep(self.resume_delay).await;
        while self.segments.try_recv().is_ok() {}
        self.capturer.resume();
    }
}

impl Voice for MicrophoneVoice {
    async fn listen(&mut self, mode: ListenMode) -> Result<Heard> {
        let window = match mode {
            ListenMode::Command => COMMAND_WINDOW,
            ListenMode::FollowUp => self.follow_up_window,
        };
        let mut deadline = Instant::now() + window;
        let mut woken = false;
        if !self.capturer.is_listening() {
            self.capturer.resume();
        }

        loop {
            let segment = match tokio::time::timeout_at(deadline, self.segments.recv()).await {
                Ok(Some(segment)) => segment,
                Ok(None) => return Ok(Heard::Closed),
                Err(_) => return Ok(Heard::Silence),
            };
            let Some(text) = self.transcribe(segment).await else {
                continue;
            };

            let wake_word = if woken { None } else { self.wake_word.clone() };
            match gate(&text, wake_word.as_deref(), mode) {
                Gate::Command(command) => {
                    self.earcon(Earcon::Processing).await;
                    info!("🗣️ Command: {}", command);
                    return Ok(Heard::Text(command));
                }
                Gate::Woken => {
                    info!("👂 Wake word detected");
                    self.earcon(Earcon::Wake).await;
                    woken = true;
                    deadline = Instant::now() + self.follow_up_window;
                }
                Gate::Discarded => {
                    info!("❌ Command cancelled");
                    self.earcon(Earcon::Cancelled).await;
                    return Ok(Heard::Silence);
                }
                Gate::Ignored => debug!("Not addressed to VAL: {}", text),
            }
        }
    }

    async fn speak(&mut self, text: &str) -> Result<()> {
        let sentences = split_sentences(&speakable(text));
        if sentences.is_empty() {
            return Ok(());
        }
        info!("🔊 VAL: {}", text);

        let gain = self.gain();
        for sentence in sentences {
            let synthesizer = self.synthesizer.clone();
            match tokio::task::spawn_blocking(move || synthesizer.lock().synthesize(&sentence)).await? {
                Ok(mut samples) => {
                    apply_gain(&mut samples, gain);
                    // Play each sentence as soon as it is ready
                    self.play(samples).await;
                }
                Err(e) => warn!("Skipping sentence: {:#}", e),
            }
        }
        Ok(())
    }

    async fn earcon(&mut self, earcon: Earcon) {
        let (frequency, duration_ms) = earcon.tone();
        let samples = tone(frequency, duration_ms, self.output_rate, EARCON_VOLUME * self.gain());
        self.play(samples).await;
    }

    fn set_mode(&mut self, mode: VoiceMode) {
        self.mode = mode;
    }
}
