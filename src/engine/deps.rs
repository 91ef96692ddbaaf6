//! Dependency listing, installation and a static audit.

use std::path::Path;

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::env::ProjectKind;
use super::process::Cmd;
use super::undo::{UndoAction, UndoManager};
use crate::memory::{Event, Memory};

/// Packages with a known caveat.
const AUDIT_NOTES: &[(&str, &str)] = &[
    ("left-pad", "Known risk: tiny package with a history of being unpublished"),
    ("pyjwt", "Secure if configured: always pin algorithms when decoding"),
    ("request", "Deprecated: use a maintained HTTP client"),
    ("pycrypto", "Unmaintained: use pycryptodome or cryptography"),
];

fn python_deps(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split(['=', '<', '>', '~', '[', ';', ' ']).next().unwrap_or(line).to_string())
        .collect()
}

fn node_deps(text: &str) -> Vec<String> {
    let Ok(package) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|section| package.get(section).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

/// Entries of the top-level `dependencies:` and `dev_dependencies:` blocks of a pubspec.
fn flutter_deps(text: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in text.lines() {
        if !line.starts_with(' ') {
            in_block = matches!(line.trim_end(), "dependencies:" | "dev_dependencies:");
            continue;
        }
        let trimmed = line.trim_start();
        if in_block
            && line.len() - trimmed.len() == 2
            && let Some((name, _)) = trimmed.split_once(':')
        {
            deps.push(name.to_string());
        }
    }
    deps
}

/// Declared dependencies of the project in `cwd`. The list is also remembered.
pub async fn list(memory: &Memory, cwd: &Path) -> Result<(ProjectKind, Vec<String>)> {
    let kind = ProjectKind::detect(cwd);
    let read = |file: &str| std::fs::read_to_string(cwd.join(file)).unwrap_or_default();
    let deps = match kind {
        ProjectKind::Python => python_deps(&read("requirements.txt")),
        ProjectKind::Node => node_deps(&read("package.json")),
        ProjectKind::Flutter => flutter_deps(&read("pubspec.yaml")),
        ProjectKind::General => Vec::new(),
    };

    let project = cwd.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    memory.remember(&format!("deps_{}_{}", kind.as_str(), project), &json!(deps), "project", None).await?;
    Ok((kind, deps))
}

/// Human summary of a dependency list, at most ten names.
pub fn summarize(kind: ProjectKind, deps: &[String]) -> String {
    let shown = deps.iter().take(10).cloned().collect::<Vec<_>>().join(", ");
    format!("📦 Deps ({}): {}{}", kind.as_str(), shown, if deps.len() > 10 { "..." } else { "" })
}

/// Ask the package manager for outdated packages. `None` when unsupported.
pub async fn outdated(cwd: &Path) -> Result<Option<String>> {
    let cmd = match ProjectKind::detect(cwd) {
        ProjectKind::Node => Cmd::new("npm").arg("outdated"),
        ProjectKind::Python => Cmd::new("pip").args(["list", "--outdated"]),
        ProjectKind::Flutter => Cmd::new("flutter").args(["pub", "outdated"]),
        ProjectKind::General => return Ok(None),
    };
    // npm exits 1 when something is outdated
    let result = cmd.dir(cwd).allow_fail().run().await?;
    Ok(Some(result.stdout_trimmed().chars().take(200).collect()))
}

/// Install a package. The installation can be undone.
pub async fn add(memory: &Memory, cwd: &Path, name: &str, dev: bool, undo: &UndoManager) -> Result<String> {
    let kind = ProjectKind::detect(cwd);
    let cmd = match kind {
        ProjectKind::Node => Cmd::new("npm").args(["install", name, if dev { "--save-dev" } else { "--save" }]),
        ProjectKind::Python => Cmd::new("pip").args(["install", name]),
        ProjectKind::Flutter if dev => Cmd::new("flutter").args(["pub", "add", "--dev", name]),
        ProjectKind::Flutter => Cmd::new("flutter").args(["pub", "add", name]),
        ProjectKind::General => bail!("Unsupported project type"),
    };
    let result = cmd.dir(cwd).error_msg(format!("Failed to install {}", name)).run().await?;

    if let Err(e) = memory.log_event(Event::new("dep_added").data(json!({"name": name, "type": kind.as_str(), "dev": dev}))).await {
        warn!("Failed to log dependency: {}", e);
    }
    undo.log_operation(
        "install_dependency",
        json!({"name": name, "type": kind.as_str(), "cwd": cwd}),
        UndoAction::Uninstall { name: name.to_string(), ecosystem: kind.as_str().to_string(), cwd: cwd.to_path_buf() },
    )?;
    info!("➕ Added {} ({})", name, kind.as_str());
    Ok(format!("➕ Added {} ({}): {}", name, kind.as_str(), result.stdout_trimmed()))
}

pub async fn remove(memory: &Memory, cwd: &Path, name: &str) -> Result<String> {
    let kind = ProjectKind::detect(cwd);
    let cmd = match kind {
        ProjectKind::Node => Cmd::new("npm").args(["uninstall", name]),
        ProjectKind::Python => Cmd::new("pip").args(["uninstall", "-y", name]),
        ProjectKind::Flutter => Cmd::new("flutter").args(["pub", "remove", name]),
        ProjectKind::General => bail!("Unsupported project type"),
    };
    let result = cmd.dir(cwd).error_msg(format!("Failed to remove {}", name)).run().await?;
    if let Err(e) = memory.log_event(Event::new("dep_removed").data(json!({"name": name, "type": kind.as_str()}))).await {
        warn!("Failed to log dependency removal: {}", e);
    }
    Ok(format!("➖ Removed {}: {}", name, result.stdout_trimmed()))
}

/// Static audit note for a package.
pub fn audit(name: &str, kind: ProjectKind) -> String {
    let lowered = name.to_lowercase();
    AUDIT_NOTES
        .iter()
        .find(|(package, _)| *package == lowered)
        .map(|(_, note)| format!("⚠️ {}: {}", name, note))
        .unwrap_or_else(|| format!("✅ {} good for {}.", name, kind.as_str()))
}
