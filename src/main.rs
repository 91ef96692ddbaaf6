//! VAL - a local voice-driven developer assistant.
//!
//! Without arguments VAL runs the interactive project wizard. With
//! `--daemon` it listens for "hey val" on the microphone (Silero VAD and
//! Whisper), speaks through Kokoro and talks to a local model through Ollama.

mod agent;
mod audio;
mod blueprint;
mod config;
mod daemon;
mod engine;
mod error;
mod intent;
mod llm;
mod memory;
mod models;
mod session;
mod stt;
mod tts;
mod voice;
mod wizard;

use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::{FormatTime, LocalTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::AppConfig;
use daemon::Daemon;
use engine::{Router, UndoManager};
use intent::IntentExtractor;
use llm::LlmClient;
use memory::Memory;
use session::SharedSession;
use voice::{ConsoleVoice, MicrophoneVoice, Voice};
use wizard::Wizard;

/// How long a console prompt waits before the daemon runs background work.
const CONSOLE_COMMAND_WINDOW: Duration = Duration::from_secs(5);

fn timer() -> impl FormatTime {
    LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]"))
}

/// Log to the console and to `<data>/logs/val.log`.
///
/// Respects RUST_LOG, falls back to the debug flag, defaults to info.
fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if config.debug { "debug" } else { "info" }))
        .context("Invalid log filter")?;

    let log_path = config.logs_dir().join("val.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_timer(timer()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_timer(timer())
                .with_writer(std::sync::Mutex::new(log_file)),
        )
        .init();
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn wait_for_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
        _ = token.cancelled() => {}
    }

    token.cancel();
}

/// Run the daemon loop with `voice` until it stops or a signal arrives.
async fn run_daemon<V: Voice>(voice: V, memory: Memory, session: SharedSession, router: Router, extractor: IntentExtractor, cancel: CancellationToken) -> Result<()> {
    let mut daemon = Daemon::new(voice, memory, session, router, extractor, cancel);
    daemon.run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_args();
    config.ensure_dirs()?;
    init_logging(&config)?;

    info!("🎤 VAL v{}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    if config.download_models {
        let download = config.clone();
        tokio::task::spawn_blocking(move || models::download_models(&download)).await??;
        return Ok(());
    }

    let memory = Memory::open(&config.memory_path()).await?;
    if config.init_memory {
        let stats = memory.initialize_defaults(&config.project_location.to_string_lossy()).await?;
        info!(
            "✅ Memory initialised: {} preferences, {} safety rules, {} workflows, {} facts",
            stats.preferences, stats.safety_rules, stats.workflows, stats.facts
        );
        return Ok(());
    }

    let llm = Arc::new(LlmClient::new(&config)?);
    let session = session::shared();
    let undo = Arc::new(UndoManager::open(&config.logs_dir(), memory.clone())?);
    let router = Router::new(memory.clone(), session.clone(), undo, llm.clone(), config.project_location.clone());

    if !config.daemon {
        let stdin = std::io::stdin().lock();
        let mut wizard =
            Wizard::new(stdin, std::io::stdout(), memory, session, router, llm, config.project_location.clone()).with_debug(config.debug);
        return wizard.run().await;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    let status = (config.status_port > 0).then(|| {
        let (port, session, token) = (config.status_port, session.clone(), cancel.child_token());
        tokio::spawn(async move {
            if let Err(e) = daemon::status::serve(port, session, token).await {
                warn!("⚠️ Status endpoint unavailable: {:#}", e);
            }
        })
    });

    let extractor = IntentExtractor::new(memory.clone(), llm, session.clone());
    let follow_up = Duration::from_secs(config.follow_up_timeout_secs);
    let result = if config.console {
        let voice = ConsoleVoice::stdio(CONSOLE_COMMAND_WINDOW, follow_up);
        run_daemon(voice, memory, session, router, extractor, cancel.clone()).await
    } else {
        let wake_word_enabled = memory.preference_bool("wake_word_enabled", true).await?;
        match MicrophoneVoice::new(&config, wake_word_enabled) {
            Ok(voice) => run_daemon(voice, memory, session, router, extractor, cancel.clone()).await,
            Err(e) => {
                error!("❌ Voice setup failed: {:#}", e);
                error!("Run 'val --download-models' to fetch the speech models, or use --console.");
                Err(e)
            }
        }
    };

    cancel.cancel();
    if let Some(status) = status {
        let _ = tokio::time::timeout(Duration::from_millis(500), status).await;
    }
    info!("✅ VAL stopped");
    result
}
