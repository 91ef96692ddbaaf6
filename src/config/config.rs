//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sherpa_provider())
    }
}

impl Provider {
    /// Provider string understood by sherpa-rs.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Directory holding the Kokoro voice files.
const KOKORO_DIR: &str = "kokoro-multi-lang-v1_0";

/// VAL configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "val")]
#[command(author, version, about = "A local voice-driven developer assistant", long_about = None)]
pub struct AppConfig {
    /// Run the voice daemon instead of the project wizard
    #[arg(long)]
    pub daemon: bool,

    /// Daemon reads commands from stdin and prints replies instead of using mic and speaker
    #[arg(long, requires = "daemon")]
    pub console: bool,

    /// Seed the memory database with default preferences and rules, then exit
    #[arg(long)]
    pub init_memory: bool,

    /// Download the VAD, Whisper and Kokoro models, then exit
    #[arg(long)]
    pub download_models: bool,

    /// Enable debug logging (and blueprint dumps in the wizard)
    #[arg(long, short = 'v', visible_alias = "verbose")]
    pub debug: bool,

    /// Root for logs, memory, models and voice data
    #[arg(long, env = "VAL_DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Directory containing the VAD and Whisper models (defaults to <data-dir>/models)
    #[arg(long, short = 'd', env = "MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Where new projects are created when no location is given
    #[arg(long, default_value_os_t = default_project_location())]
    pub project_location: PathBuf,

    /// Port of the status endpoint while the daemon runs (0 disables it)
    #[arg(long, default_value = "8000")]
    pub status_port: u16,

    /// Wake word that starts a spoken command
    #[arg(long, short = 'w', default_value = "hey val")]
    pub wake_word: String,

    /// Seconds to wait for a follow-up answer before treating it as silence
    #[arg(long, default_value = "8")]
    pub follow_up_timeout_secs: u64,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Voice activity detection threshold (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// VAD silence duration in seconds (how long to wait before considering speech ended)
    #[arg(long, default_value = "1.2")]
    pub vad_silence_duration: f32,

    /// Ollama API URL
    #[arg(long, short = 'u', env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Ollama model name
    #[arg(long, short = 'm', env = "OLLAMA_MODEL", default_value = "mistral")]
    pub ollama_model: String,

    /// Seconds before a language model request is abandoned
    #[arg(long, default_value = "120")]
    pub llm_timeout_secs: u64,

    /// Maximum conversation history length
    #[arg(long, default_value = "10")]
    pub max_history: usize,

    /// Text-to-speech speed multiplier
    #[arg(long, default_value = "1.0")]
    pub tts_speed: f32,

    /// TTS voice name for Kokoro (e.g., af_bella, bf_emma)
    #[arg(long, default_value = "af_bella")]
    pub tts_voice: String,

    /// TTS speaker ID for Kokoro model (af_bella=2 in v1.0)
    #[arg(long, default_value = "2")]
    pub tts_speaker_id: i32,

    /// STT language code, or "auto" for detection
    #[arg(long, default_value = "en")]
    pub stt_language: String,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Provider for STT (overrides --provider for speech recognition)
    #[arg(long, value_enum)]
    pub stt_provider: Option<Provider>,

    /// Provider for TTS (overrides --provider for speech synthesis)
    #[arg(long, value_enum)]
    pub tts_provider: Option<Provider>,

    /// Delay in milliseconds before resuming the microphone after playback
    #[arg(long, default_value = "300")]
    pub post_playback_delay_ms: u64,

    /// Number of threads for all models (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// VAD threads (0 = use num_threads, typically 1)
    #[arg(long, default_value = "0")]
    pub vad_threads: usize,

    /// STT threads (0 = use num_threads)
    #[arg(long, default_value = "0")]
    pub stt_threads: usize,

    /// TTS threads (0 = use num_threads)
    #[arg(long, default_value = "0")]
    pub tts_threads: usize,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Fill in thread counts left at 0.
    ///
    /// With CUDA the GPU handles parallelism, so one thread per model avoids
    /// contention. On CPU, STT and TTS get a third of the cores each.
    fn normalize_thread_counts(&mut self) {
        let cpu_cores = num_cpus::get();
        let using_cuda = self.effective_stt_provider() == Provider::Cuda || self.effective_tts_provider() == Provider::Cuda;

        if self.num_threads == 0 {
            self.num_threads = if using_cuda { 1 } else { (cpu_cores / 3).max(1) };
        }
        if self.vad_threads == 0 {
            self.vad_threads = 1;
        }
        if self.stt_threads == 0 {
            self.stt_threads = if self.effective_stt_provider() == Provider::Cuda { 1 } else { self.num_threads };
        }
        if self.tts_threads == 0 {
            self.tts_threads = if self.effective_tts_provider() == Provider::Cuda { 1 } else { self.num_threads };
        }
    }

    pub fn effective_stt_provider(&self) -> Provider {
        self.stt_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    pub fn effective_tts_provider(&self) -> Provider {
        self.tts_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory").join("val_memory.db")
    }

    /// Directory of the VAD and Whisper models.
    pub fn models_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| self.data_dir.join("models"))
    }

    /// Directory of the Kokoro voice.
    pub fn voice_dir(&self) -> PathBuf {
        self.data_dir.join("voice")
    }

    /// Create the data directory layout.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        let memory_dir = self.data_dir.join("memory");
        for dir in [self.logs_dir(), memory_dir, self.models_dir(), self.voice_dir()] {
            std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.models_dir().join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.models_dir().join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.models_dir().join("whisper").join("whisper-small-tokens.txt")
    }

    /// STT language for Whisper; empty string means auto-detection.
    pub fn effective_stt_language(&self) -> &str {
        if self.stt_language.eq_ignore_ascii_case("auto") { "" } else { &self.stt_language }
    }

    pub fn vad_model_path(&self) -> PathBuf {
        self.models_dir().join("silero_vad.onnx")
    }

    pub fn kokoro_dir(&self) -> PathBuf {
        self.voice_dir().join(KOKORO_DIR)
    }

    pub fn tts_model_path(&self) -> PathBuf {
        self.kokoro_dir().join("model.onnx")
    }

    pub fn tts_voices_path(&self) -> PathBuf {
        self.kokoro_dir().join("voices.bin")
    }

    pub fn tts_tokens_path(&self) -> PathBuf {
        self.kokoro_dir().join("tokens.txt")
    }

    pub fn tts_data_dir(&self) -> PathBuf {
        self.kokoro_dir().join("espeak-ng-data")
    }

    pub fn tts_dict_dir(&self) -> PathBuf {
        self.kokoro_dir().join("dict")
    }

    /// Lexicon files for English voices; other languages go through espeak-ng.
    pub fn tts_lexicon(&self) -> String {
        let dir = self.kokoro_dir();
        match self.tts_voice.get(..2) {
            Some("bf" | "bm") => dir.join("lexicon-gb-en.txt").to_string_lossy().to_string(),
            Some("af" | "am") | None => dir.join("lexicon-us-en.txt").to_string_lossy().to_string(),
            Some(_) => String::new(),
        }
    }

    /// espeak-ng language for voices without a lexicon.
    pub fn tts_language(&self) -> &str {
        match self.tts_voice.get(..2) {
            Some("ef" | "em") => "es",
            Some("ff") => "fr",
            Some("hf" | "hm") => "hi",
            Some("if" | "im") => "it",
            Some("jf" | "jm") => "ja",
            Some("pf" | "pm") => "pt-br",
            _ => "",
        }
    }

    /// Model files the microphone voice needs.
    pub fn voice_model_files(&self) -> Vec<PathBuf> {
        vec![
            self.whisper_encoder_path(),
            self.whisper_decoder_path(),
            self.whisper_tokens_path(),
            self.vad_model_path(),
            self.tts_model_path(),
            self.tts_voices_path(),
            self.tts_tokens_path(),
        ]
    }

    /// Validate settings used by the microphone voice.
    ///
    /// # Errors
    /// Returns an error naming the first missing model file or bad value.
    pub fn validate_voice(&self) -> Result<()> {
        if let Some(missing) = self.voice_model_files().into_iter().find(|p| !p.exists()) {
            anyhow::bail!("Required model file not found: {} (run with --download-models)", missing.display());
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }
        if self.tts_speed <= 0.0 {
            anyhow::bail!("TTS speed must be positive");
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Data directory: {}", self.data_dir.display());
        info!("  Project location: {}", self.project_location.display());
        info!("  Ollama: {} ({})", self.ollama_url, self.ollama_model);
        if self.daemon {
            info!("  Mode: daemon ({})", if self.console { "console" } else { "microphone" });
            info!("  Wake word: {}", self.wake_word);
            if self.status_port > 0 {
                info!("  Status port: {}", self.status_port);
            }
        }
        if self.daemon && !self.console {
            info!("  Sample rate: {} Hz, VAD threshold: {}", self.sample_rate, self.vad_threshold);
            info!("  TTS voice: {} (speed {})", self.tts_voice, self.tts_speed);
            info!("  STT language: {}", self.stt_language);
            info!("  Providers: STT={}, TTS={}", self.effective_stt_provider(), self.effective_tts_provider());
            info!("  Threads: VAD={}, STT={}, TTS={}", self.vad_threads, self.stt_threads, self.tts_threads);
        }
    }
}

/// `~/.val`, or `./val-data` without a home directory.
fn default_data_dir() -> PathBuf {
    dirs::home_dir().map(|home| home.join(".val")).unwrap_or_else(|| PathBuf::from("val-data"))
}

/// `~/Projects`, or `./projects` without a home directory.
fn default_project_location() -> PathBuf {
    dirs::home_dir().map(|home| home.join("Projects")).unwrap_or_else(|| PathBuf::from("projects"))
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    const NVIDIA_PATHS: [&str; 6] =
        ["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvidia-uvm", "/dev/nvhost-ctrl", "/dev/nvhost-ctrl-gpu", "/etc/nv_tegra_release"];
    NVIDIA_PATHS.iter().any(|p| Path::new(p).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["val"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--data-dir", "/srv/val"]);
        assert!(!config.daemon);
        assert_eq!(config.status_port, 8000);
        assert_eq!(config.wake_word, "hey val");
        assert_eq!(config.memory_path(), PathBuf::from("/srv/val/memory/val_memory.db"));
        assert_eq!(config.vad_model_path(), PathBuf::from("/srv/val/models/silero_vad.onnx"));
        assert_eq!(config.tts_model_path(), PathBuf::from("/srv/val/voice/kokoro-multi-lang-v1_0/model.onnx"));
    }

    #[test]
    fn test_console_requires_daemon() {
        assert!(AppConfig::try_parse_from(["val", "--console"]).is_err());
        let config = parse(&["--daemon", "--console", "--status-port", "0", "--debug"]);
        assert!(config.console && config.debug);
        assert_eq!(config.status_port, 0);
    }

    #[test]
    fn test_model_dir_override() {
        let config = parse(&["--data-dir", "/srv/val", "--model-dir", "/models"]);
        assert_eq!(config.whisper_tokens_path(), PathBuf::from("/models/whisper/whisper-small-tokens.txt"));
        assert_eq!(config.kokoro_dir(), PathBuf::from("/srv/val/voice/kokoro-multi-lang-v1_0"));
    }

    #[test]
    fn test_voice_language() {
        let mut config = parse(&["--tts-voice", "bf_emma"]);
        assert!(config.tts_lexicon().ends_with("lexicon-gb-en.txt"));
        assert_eq!(config.tts_language(), "");
        config.tts_voice = "ff_siwis".to_string();
        assert_eq!(config.tts_lexicon(), "");
        assert_eq!(config.tts_language(), "fr");
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse(&["--data-dir", dir.path().to_str().unwrap()]);
        config.ensure_dirs().unwrap();
        for name in ["logs", "memory", "models", "voice"] {
            assert!(dir.path().join(name).is_dir());
        }
        assert!(config.validate_voice().is_err());
    }
}
