//! External command execution with consistent error handling.
//!
//! Every tool VAL drives (git, npm, pip, flutter, editors) goes through
//! [`Cmd`] so failures carry the program name and its stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: BTreeMap<String, String>,
    allow_fail: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            envs: BTreeMap::new(),
            allow_fail: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Extra environment variables, e.g. the ones loaded from a project `.env`.
    pub fn envs(mut self, envs: &BTreeMap<String, String>) -> Self {
        self.envs.extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Do not fail on a non-zero exit code.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Command line as typed in a shell, for messages and safety checks.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)).collect::<Vec<_>>().join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.envs);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion and capture output.
    ///
    /// # Errors
    /// Fails if the program cannot be started, or exits non-zero unless
    /// [`Cmd::allow_fail`] was set.
    pub async fn run(self) -> Result<CommandResult> {
        debug!("Running: {}", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self.error_prefix.unwrap_or_else(|| format!("'{}' failed", self.program));
            match result.stderr_trimmed() {
                "" => bail!("{} (exit code {})", prefix, result.code()),
                stderr => bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr),
            }
        }

        Ok(result)
    }

    /// Start without waiting, detached from our stdio. Returns the process id.
    ///
    /// # Errors
    /// Fails if the program cannot be started.
    pub fn spawn(self) -> Result<u32> {
        debug!("Spawning: {}", self.display());
        let child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;
        Ok(child.id().unwrap_or_default())
    }
}

/// Whether `program` can be found on `PATH`.
pub fn exists(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}
