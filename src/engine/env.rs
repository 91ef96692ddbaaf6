//! Project type detection and `.env` management.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::memory::{Event, Memory};

/// Broad project family, used to pick env templates, package managers and Dockerfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Flutter,
    Node,
    Python,
    General,
}

impl ProjectKind {
    /// Detect from marker files in `cwd`.
    pub fn detect(cwd: &Path) -> Self {
        if cwd.join("pubspec.yaml").exists() {
            return ProjectKind::Flutter;
        }
        if cwd.join("package.json").exists() {
            return ProjectKind::Node;
        }
        let has_python = std::fs::read_dir(cwd)
            .map(|entries| entries.flatten().any(|e| e.path().extension().is_some_and(|ext| ext == "py")))
            .unwrap_or(false);
        if cwd.join("requirements.txt").exists() || has_python {
            return ProjectKind::Python;
        }
        ProjectKind::General
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "flutter" | "dart" => Some(ProjectKind::Flutter),
            "node" | "react" | "vue" | "svelte" | "javascript" => Some(ProjectKind::Node),
            "python" | "flask" | "django" | "data" => Some(ProjectKind::Python),
            "general" => Some(ProjectKind::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Flutter => "flutter",
            ProjectKind::Node => "node",
            ProjectKind::Python => "python",
            ProjectKind::General => "general",
        }
    }

    /// Default variables for a fresh `.env`.
    pub fn env_template(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProjectKind::Python => &[("DATABASE_URL", "sqlite:///app.db"), ("SECRET_KEY", "dev-secret")],
            ProjectKind::Node => &[("PORT", "3000"), ("JWT_SECRET", "dev-jwt")],
            ProjectKind::Flutter => &[("API_BASE", "http://localhost:8000")],
            ProjectKind::General => &[("APP_NAME", "My App")],
        }
    }
}

/// Parse `KEY=value` lines, skipping comments and blanks.
pub fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

/// Write `.env` and `.env.example` for the project and return the variables.
///
/// # Arguments
/// * `cwd` - Project directory
/// * `kind` - Template to use, detected from the project when `None`
pub async fn create_env(memory: &Memory, cwd: &Path, kind: Option<ProjectKind>) -> Result<(ProjectKind, BTreeMap<String, String>)> {
    let kind = kind.unwrap_or_else(|| ProjectKind::detect(cwd));
    let vars: BTreeMap<String, String> = kind.env_template().iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

    let env_text = vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("\n");
    std::fs::write(cwd.join(".env"), env_text).with_context(|| format!("Failed to write .env in {}", cwd.display()))?;
    let example = vars.keys().map(|k| format!("{}={}_example", k, k.to_lowercase())).collect::<Vec<_>>().join("\n");
    std::fs::write(cwd.join(".env.example"), example)?;

    memory.remember(&format!("env_template_{}", kind.as_str()), &json!(vars), "project", None).await?;
    if let Err(e) = memory.log_event(Event::new("env_created").data(json!({"type": kind.as_str(), "path": cwd}))).await {
        warn!("Failed to log env creation: {}", e);
    }
    info!("🔐 .env created for {} at {}", kind.as_str(), cwd.display());
    Ok((kind, vars))
}

/// Read the project's `.env`, creating it first if missing.
///
/// The `prod` configuration forces `DEBUG=false`.
pub async fn load_env(memory: &Memory, cwd: &Path, config: &str) -> Result<BTreeMap<String, String>> {
    let path = cwd.join(".env");
    let mut vars = match std::fs::read_to_string(&path) {
        Ok(text) => parse_env(&text),
        Err(_) => create_env(memory, cwd, None).await?.1,
    };
    if config == "prod" {
        vars.insert("DEBUG".to_string(), "false".to_string());
    }

    if let Err(e) = memory.log_event(Event::new("env_loaded").data(json!({"config": config, "path": cwd}))).await {
        warn!("Failed to log env load: {}", e);
    }
    Ok(vars)
}

pub async fn switch_config(memory: &Memory, cwd: &Path, config: &str) -> Result<BTreeMap<String, String>> {
    load_env(memory, cwd, config).await
}
