//! Terminal stand-in for the microphone: one line in, printed replies out.

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tracing::debug;

use super::{Earcon, Gate, Heard, ListenMode, Voice, gate};
use crate::session::VoiceMode;

pub struct ConsoleVoice<R, W> {
    lines: Lines<R>,
    output: W,
    mode: VoiceMode,
    command_window: Duration,
    follow_up_window: Duration,
}

impl ConsoleVoice<BufReader<Stdin>, Stdout> {
    /// Console on stdin/stdout. Command prompts return silence every
    /// `command_window` so background work keeps running.
    pub fn stdio(command_window: Duration, follow_up_window: Duration) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), command_window, follow_up_window)
    }
}

impl<R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin> ConsoleVoice<R, W> {
    pub fn new(input: R, output: W, command_window: Duration, follow_up_window: Duration) -> Self {
        Self { lines: input.lines(), output, mode: VoiceMode::Normal, command_window, follow_up_window }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    async fn write(&mut self, text: &str) -> anyhow::Result<()> {
        self.output.write_all(text.as_bytes()).await.context("Failed to write to console")?;
        self.output.flush().await.context("Failed to flush console")
    }
}

impl<R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin> Voice for ConsoleVoice<R, W> {
    async fn listen(&mut self, mode: ListenMode) -> anyhow::Result<Heard> {
        let (prompt, window) = match mode {
            ListenMode::Command => ("val> ", self.command_window),
            ListenMode::FollowUp => ("...> ", self.follow_up_window),
        };
        self.write(prompt).await?;

        let line = match tokio::time::timeout(window, self.lines.next_line()).await {
            Ok(line) => line.context("Failed to read from console")?,
            Err(_) => {
                self.write("\n").await?;
                return Ok(Heard::Silence);
            }
        };
        let Some(line) = line else {
            return Ok(Heard::Closed);
        };
        Ok(match gate(&line, None, mode) {
            Gate::Command(text) => Heard::Text(text),
            other => {
                debug!("Console input gated: {:?}", other);
                Heard::Silence
            }
        })
    }

    async fn speak(&mut self, text: &str) -> anyhow::Result<()> {
        let line = match self.mode {
            VoiceMode::Normal => format!("🔊 {}\n", text),
            VoiceMode::Whisper => format!("🤫 {}\n", text.to_lowercase()),
        };
        self.write(&line).await
    }

    async fn earcon(&mut self, earcon: Earcon) {
        debug!("Earcon: {:?}", earcon);
    }

    fn set_mode(&mut self, mode: VoiceMode) {
        self.mode = mode;
    }
}
