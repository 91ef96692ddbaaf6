//! Launch editors, browsers and other desktop applications.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use super::process::{self, Cmd};

/// Applications VAL knows how to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum App {
    Editor,
    Browser,
    Terminal,
    Postman,
    Docker,
}

impl App {
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "code" | "vscode" | "vs code" | "editor" | "visual studio code" => Some(App::Editor),
            "browser" | "chrome" | "firefox" | "web" => Some(App::Browser),
            "terminal" | "shell" | "console" => Some(App::Terminal),
            "postman" => Some(App::Postman),
            "docker" | "docker desktop" => Some(App::Docker),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            App::Editor => "VS Code",
            App::Browser => "browser",
            App::Terminal => "terminal",
            App::Postman => "Postman",
            App::Docker => "Docker",
        }
    }
}

/// Platform command that opens `app`, pointed at `target` where that makes sense.
pub fn launch_command(app: App, target: &Path) -> Cmd {
    let target = target.display().to_string();
    let macos = cfg!(target_os = "macos");
    match app {
        App::Editor => Cmd::new("code").arg(target),
        App::Browser if macos => Cmd::new("open").arg("http://localhost:3000"),
        App::Browser => Cmd::new("xdg-open").arg("http://localhost:3000"),
        App::Terminal if macos => Cmd::new("open").args(["-a", "Terminal", target.as_str()]),
        App::Terminal => Cmd::new("x-terminal-emulator").args(["--working-directory", target.as_str()]),
        App::Postman if macos => Cmd::new("open").args(["-a", "Postman"]),
        App::Postman => Cmd::new("postman"),
        App::Docker if macos => Cmd::new("open").args(["-a", "Docker"]),
        App::Docker => Cmd::new("systemctl").args(["--user", "start", "docker-desktop"]),
    }
}

/// Open an application by spoken name.
///
/// # Errors
/// Fails for unknown names or when the launcher cannot be started.
pub fn open_app(name: &str, target: &Path) -> Result<String> {
    let Some(app) = App::parse(name) else {
        bail!("I don't know how to open {}", name);
    };
    let cmd = launch_command(app, target);
    cmd.spawn()?;
    info!("🚀 Opened {}", app.label());
    Ok(format!("🚀 Opened {}", app.label()))
}

/// Open the project in the code editor if it is installed.
pub fn open_editor(project: &Path) -> Result<String> {
    if !process::exists("code") {
        bail!("VS Code is not installed (no 'code' on PATH)");
    }
    open_app("code", project)
}
