//! How VAL hears and talks.
//!
//! The daemon only sees the [`Voice`] trait. The microphone voice runs
//! Silero VAD, Whisper and Kokoro; the console voice reads stdin and prints.

mod console;
mod microphone;

use std::sync::LazyLock;

use regex::Regex;

pub use console::ConsoleVoice;
pub use microphone::MicrophoneVoice;

use crate::session::VoiceMode;

/// What the daemon is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// A new command, gated by the wake word.
    Command,
    /// An answer to a question VAL just asked; no wake word needed.
    FollowUp,
}

/// Result of one listen call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Text(String),
    /// Nothing usable within the listen window.
    Silence,
    /// The input is gone (console EOF).
    Closed,
}

/// Short tones marking dialogue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Earcon {
    Wake,
    Listening,
    Processing,
    Cancelled,
}

impl Earcon {
    /// Frequency in Hz and duration in ms.
    pub fn tone(&self) -> (f32, u32) {
        match self {
            Earcon::Wake => (1000.0, 200),
            Earcon::Listening => (800.0, 100),
            Earcon::Processing => (800.0, 150),
            Earcon::Cancelled => (400.0, 300),
        }
    }
}

/// Speech input and output.
#[allow(async_fn_in_trait)]
pub trait Voice {
    /// Wait for one utterance.
    async fn listen(&mut self, mode: ListenMode) -> anyhow::Result<Heard>;

    async fn speak(&mut self, text: &str) -> anyhow::Result<()>;

    async fn earcon(&mut self, earcon: Earcon);

    fn set_mode(&mut self, mode: VoiceMode);
}

/// What the wake-word gate made of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Command(String),
    /// Only the wake word was heard; the command follows.
    Woken,
    /// The user called the command off.
    Discarded,
    /// No wake word; not meant for VAL.
    Ignored,
}

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase, drop commas and sentence punctuation, collapse whitespace.
/// Dots inside words (`app.py`) survive.
fn normalize(text: &str) -> String {
    let text = text.to_lowercase().replace([',', '!', '?', '"'], " ");
    let words: Vec<&str> = text.split_whitespace().map(|w| w.trim_end_matches('.')).filter(|w| !w.is_empty()).collect();
    words.join(" ")
}

fn strip_words(text: &str, words: &[&str]) -> String {
    let mut text = format!(" {} ", text);
    for word in words {
        text = text.replace(&format!(" {} ", word), " ");
    }
    SPACES.replace_all(text.trim(), " ").to_string()
}

/// Apply the wake-word rules to a transcript.
///
/// Commands need the wake word when one is set; "cancel" or "stop val"
/// anywhere in a command discards it. The wake word and "execute" are
/// stripped from what is passed on. Follow-ups pass through untouched
/// apart from the stripping, so "cancel" still reaches the dialogue.
pub fn gate(transcript: &str, wake_word: Option<&str>, mode: ListenMode) -> Gate {
    let text = normalize(transcript);
    let wake = wake_word.map(normalize).filter(|w| !w.is_empty());

    if mode == ListenMode::Command {
        if let Some(wake) = wake.as_deref()
            && !format!(" {} ", text).contains(&format!(" {} ", wake))
        {
            return Gate::Ignored;
        }
        let padded = format!(" {} ", text);
        if padded.contains(" cancel ") || padded.contains(" stop val ") {
            return Gate::Discarded;
        }
    }

    let mut strip = vec!["execute"];
    if let Some(wake) = wake.as_deref() {
        strip.push(wake);
    }
    let command = strip_words(&text, &strip);
    match (command.is_empty(), mode) {
        (true, ListenMode::Command) if wake.is_some() => Gate::Woken,
        (true, _) => Gate::Ignored,
        (false, _) => Gate::Command(command),
    }
}

/// Voice driven by a script, recording everything said.
#[cfg(test)]
pub mod scripted {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedVoice {
        inputs: VecDeque<Option<String>>,
        pub spoken: Vec<String>,
        pub earcons: Vec<Earcon>,
        pub listens: Vec<ListenMode>,
        pub mode: VoiceMode,
    }

    impl ScriptedVoice {
        /// `None` entries are heard as silence; the script ending closes the input.
        pub fn new(inputs: &[Option<&str>]) -> Self {
            Self { inputs: inputs.iter().map(|i| i.map(str::to_string)).collect(), ..Default::default() }
        }

        pub fn said(&self, fragment: &str) -> bool {
            self.spoken.iter().any(|s| s.contains(fragment))
        }
    }

    impl Voice for ScriptedVoice {
        async fn listen(&mut self, mode: ListenMode) -> anyhow::Result<Heard> {
            self.listens.push(mode);
            Ok(match self.inputs.pop_front() {
                Some(Some(text)) => Heard::Text(text),
                Some(None) => Heard::Silence,
                None => Heard::Closed,
            })
        }

        async fn speak(&mut self, text: &str) -> anyhow::Result<()> {
            self.spoken.push(text.to_string());
            Ok(())
        }

        async fn earcon(&mut self, earcon: Earcon) {
            self.earcons.push(earcon);
        }

        fn set_mode(&mut self, mode: VoiceMode) {
            self.mode = mode;
        }
    }
}
