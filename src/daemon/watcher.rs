//! Background project watcher.
//!
//! Polls the newest file modification time under the current project and
//! flags the session when it moves forward, so the agent can react on its
//! next tick.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::{DateTime, Local};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::memory::Memory;
use crate::session::SharedSession;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

const SKIPPED_DIRS: [&str; 7] = [".git", "node_modules", "target", "venv", ".venv", "__pycache__", "build"];

/// Newest modification time of any file below `root`, with the file count.
fn scan(root: &Path) -> Option<(SystemTime, usize)> {
    let mut newest = None;
    let mut files = 0;
    let entries = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n)))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());
    for entry in entries {
        files += 1;
        if let Ok(modified) = entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            newest = Some(newest.map_or(modified, |n: SystemTime| n.max(modified)));
        }
    }
    newest.map(|n| (n, files))
}

pub struct ProjectWatcher {
    memory: Memory,
    session: SharedSession,
    baseline: Option<(PathBuf, SystemTime)>,
}

impl ProjectWatcher {
    pub fn new(memory: Memory, session: SharedSession) -> Self {
        Self { memory, session, baseline: None }
    }

    /// Poll every [`POLL_INTERVAL`] until cancelled.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = self.poll().await {
                    warn!("Project watcher: {:#}", e);
                }
            }
            debug!("Project watcher stopped");
        })
    }

    async fn project(&self) -> Result<Option<PathBuf>> {
        let current = self.session.lock().last_project.as_ref().map(|p| PathBuf::from(&p.path));
        if current.is_some() {
            return Ok(current);
        }
        Ok(self.memory.last_project().await?.map(|p| PathBuf::from(p.path)))
    }

    /// Check the project once. Returns whether a change was detected.
    pub async fn poll(&mut self) -> Result<bool> {
        let Some(root) = self.project().await? else {
            return Ok(false);
        };
        let scan_root = root.clone();
        let Some((newest, files)) = tokio::task::spawn_blocking(move || scan(&scan_root)).await? else {
            return Ok(false);
        };

        let changed = matches!(&self.baseline, Some((path, seen)) if *path == root && newest > *seen);
        self.baseline = Some((root.clone(), newest));
        if !changed {
            return Ok(false);
        }

        info!("📂 Change detected in {}", root.display());
        self.session.lock().project_changed = true;
        let modified: DateTime<Local> = newest.into();
        let state = json!({"status": "changed", "last_modified": modified.to_rfc3339(), "files": files});
        self.memory.update_project_state(&root.to_string_lossy(), &state).await?;
        Ok(true)
    }
}
