//! Undo stack with a trash directory.
//!
//! Every mutating engine operation records how to revert itself. Entries are
//! persisted as JSON so an undo survives a restart, and deleted or undone
//! items are moved into the trash instead of being removed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::process::Cmd;
use crate::memory::{Event, Memory};

/// Maximum number of operations kept on the stack.
const MAX_ENTRIES: usize = 50;

/// How to revert an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoAction {
    /// Move freshly created files and folders into the trash.
    RemoveCreated { paths: Vec<PathBuf> },
    /// Move a trashed item back to where it was.
    Restore { original: PathBuf, trashed: PathBuf },
    /// Uninstall a dependency added with a package manager.
    Uninstall { name: String, ecosystem: String, cwd: PathBuf },
    /// Soft-reset the last git commit.
    ResetCommit { cwd: PathBuf },
}

/// A recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub timestamp: String,
    pub operation: String,
    pub details: Value,
    pub undo: UndoAction,
}

/// Result of undoing one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    Nothing,
    Undone { operation: String, detail: String },
    Failed { operation: String, error: String },
}

impl UndoOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UndoOutcome::Failed { .. })
    }
}

impl std::fmt::Display for UndoOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndoOutcome::Nothing => write!(f, "❌ Nothing to undo"),
            UndoOutcome::Undone { operation, detail } => write!(f, "↩️ Undone: {}\n{}", operation, detail),
            UndoOutcome::Failed { error, .. } => write!(f, "❌ Undo failed: {}", error),
        }
    }
}

/// Persistent undo stack.
pub struct UndoManager {
    stack_path: PathBuf,
    trash_dir: PathBuf,
    stack: Mutex<Vec<UndoEntry>>,
    memory: Memory,
}

impl UndoManager {
    /// Load the stack from `<logs>/undo_stack.json` and make sure `<logs>/trash` exists.
    ///
    /// # Errors
    /// Returns an error if the trash directory cannot be created.
    pub fn open(logs_dir: &Path, memory: Memory) -> Result<Self> {
        let trash_dir = logs_dir.join("trash");
        std::fs::create_dir_all(&trash_dir).with_context(|| format!("Failed to create trash directory {}", trash_dir.display()))?;

        let stack_path = logs_dir.join("undo_stack.json");
        let stack = match std::fs::read_to_string(&stack_path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable undo stack {}: {}", stack_path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        Ok(Self { stack_path, trash_dir, stack: Mutex::new(stack), memory })
    }

    pub fn trash_dir(&self) -> &Path {
        &self.trash_dir
    }

    fn save(&self, stack: &[UndoEntry]) -> Result<()> {
        let text = serde_json::to_string_pretty(stack)?;
        std::fs::write(&self.stack_path, text).with_context(|| format!("Failed to write {}", self.stack_path.display()))
    }

    /// Record an operation.
    ///
    /// # Errors
    /// Returns an error if the stack cannot be written.
    pub fn log_operation(&self, operation: &str, details: Value, undo: UndoAction) -> Result<()> {
        let entry = UndoEntry { timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(), operation: operation.to_string(), details, undo };
        debug!("Undoable operation: {}", operation);

        let mut stack = self.stack.lock();
        stack.push(entry);
        if stack.len() > MAX_ENTRIES {
            let excess = stack.len() - MAX_ENTRIES;
            stack.drain(..excess);
        }
        self.save(&stack)
    }

    /// Revert the most recent operation. A failed undo is put back on the stack.
    pub async fn undo_last(&self) -> UndoOutcome {
        let Some(entry) = self.pop() else {
            return UndoOutcome::Nothing;
        };

        match self.revert(&entry.undo).await {
            Ok(detail) => {
                info!("↩️ Undone: {}", entry.operation);
                let event = Event::new("undo_executed").data(json!({"operation": entry.operation, "success": true}));
                if let Err(e) = self.memory.log_event(event).await {
                    warn!("Failed to log undo: {}", e);
                }
                UndoOutcome::Undone { operation: entry.operation, detail }
            }
            Err(e) => {
                warn!("Undo of {} failed: {:#}", entry.operation, e);
                let event = Event::new("undo_failed").data(json!({"operation": entry.operation, "error": e.to_string()})).success(false);
                if let Err(e) = self.memory.log_event(event).await {
                    warn!("Failed to log undo failure: {}", e);
                }
                let operation = entry.operation.clone();
                self.push_back(entry);
                UndoOutcome::Failed { operation, error: e.to_string() }
            }
        }
    }

    /// Revert up to `count` operations, stopping at the first failure.
    pub async fn undo_multiple(&self, count: usize) -> Vec<UndoOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..count {
            let outcome = self.undo_last().await;
            match outcome {
                UndoOutcome::Nothing => break,
                UndoOutcome::Failed { .. } => {
                    outcomes.push(outcome);
                    break;
                }
                UndoOutcome::Undone { .. } => outcomes.push(outcome),
            }
        }
        outcomes
    }

    /// Most recent operations first.
    pub fn list_operations(&self, limit: usize) -> Vec<UndoEntry> {
        self.stack.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.stack.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.lock().is_empty()
    }

    fn pop(&self) -> Option<UndoEntry> {
        let mut stack = self.stack.lock();
        let entry = stack.pop()?;
        if let Err(e) = self.save(&stack) {
            warn!("Failed to persist undo stack: {:#}", e);
        }
        Some(entry)
    }

    fn push_back(&self, entry: UndoEntry) {
        let mut stack = self.stack.lock();
        stack.push(entry);
        if let Err(e) = self.save(&stack) {
            warn!("Failed to persist undo stack: {:#}", e);
        }
    }

    /// Move `path` into the trash and return its new location.
    ///
    /// # Errors
    /// Returns an error if the path does not exist or cannot be moved.
    pub fn trash(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "item".to_string());
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

        let mut target = self.trash_dir.join(format!("{}_{}", name, stamp));
        let mut suffix = 1;
        while target.exists() {
            target = self.trash_dir.join(format!("{}_{}_{}", name, stamp, suffix));
            suffix += 1;
        }

        move_path(path, &target)?;
        Ok(target)
    }

    async fn revert(&self, action: &UndoAction) -> Result<String> {
        match action {
            UndoAction::RemoveCreated { paths } => {
                let mut moved = Vec::new();
                for path in roots(paths) {
                    if path.exists() {
                        moved.push(self.trash(path)?);
                    }
                }
                Ok(match moved.as_slice() {
                    [] => "Already removed".to_string(),
                    [single] => format!("Moved to trash: {}", single.display()),
                    many => format!("Moved {} items to trash", many.len()),
                })
            }
            UndoAction::Restore { original, trashed } => {
                if original.exists() {
                    bail!("{} already exists", original.display());
                }
                if !trashed.exists() {
                    bail!("{} is no longer in the trash", trashed.display());
                }
                if let Some(parent) = original.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                move_path(trashed, original)?;
                Ok(format!("Restored: {}", original.display()))
            }
            UndoAction::Uninstall { name, ecosystem, cwd } => {
                let cmd = match ecosystem.as_str() {
                    "node" => Cmd::new("npm").args(["uninstall", name.as_str()]),
                    "flutter" => Cmd::new("flutter").args(["pub", "remove", name.as_str()]),
                    _ => Cmd::new("pip").args(["uninstall", "-y", name.as_str()]),
                };
                let result = cmd.dir(cwd).error_msg(format!("Failed to uninstall {}", name)).run().await?;
                Ok(format!("Uninstalled {}: {}", name, result.stdout_trimmed()))
            }
            UndoAction::ResetCommit { cwd } => {
                Cmd::new("git").args(["reset", "--soft", "HEAD~1"]).dir(cwd).error_msg("Failed to reset last commit").run().await?;
                Ok("Reset last commit, changes kept staged".to_string())
            }
        }
    }
}

/// Paths with no ancestor in the same list.
fn roots(paths: &[PathBuf]) -> impl Iterator<Item = &PathBuf> {
    paths.iter().filter(|p| !paths.iter().any(|other| other != *p && p.starts_with(other)))
}

/// Rename, falling back to copy and remove across filesystems.
fn move_path(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    if from.is_dir() {
        for entry in WalkDir::new(from) {
            let entry = entry?;
            let relative = entry.path().strip_prefix(from)?;
            let target = to.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }
        std::fs::remove_dir_all(from)?;
    } else {
        std::fs::copy(from, to).with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager(dir: &Path) -> UndoManager {
        UndoManager::open(&dir.join("logs"), Memory::in_memory().await.unwrap()).unwrap()
    }

    #[test]
    fn test_roots_skip_nested_paths() {
        let paths = vec![PathBuf::from("/p/app"), PathBuf::from("/p/app/src"), PathBuf::from("/p/other.txt")];
        let roots: Vec<_> = roots(&paths).collect();
        assert_eq!(roots, vec![&PathBuf::from("/p/app"), &PathBuf::from("/p/other.txt")]);
    }

    #[tokio::test]
    async fn test_undo_created_moves_to_trash() {
        let dir = tempfile::tempdir().unwrap();
        let undo = manager(dir.path()).await;
        let project = dir.path().join("app");
        std::fs::create_dir_all(project.join("src")).unwrap();

        undo.log_operation("create_project", json!({"path": project}), UndoAction::RemoveCreated { paths: vec![project.clone(), project.join("src")] })
            .unwrap();
        let outcome = undo.undo_last().await;

        assert!(matches!(outcome, UndoOutcome::Undone { ref operation, .. } if operation == "create_project"));
        assert!(!project.exists());
        assert_eq!(std::fs::read_dir(undo.trash_dir()).unwrap().count(), 1);
        assert_eq!(undo.undo_last().await, UndoOutcome::Nothing);
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let undo = manager(dir.path()).await;
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "keep me").unwrap();

        let trashed = undo.trash(&file).unwrap();
        undo.log_operation("delete_file", json!({"path": file}), UndoAction::Restore { original: file.clone(), trashed }).unwrap();
        assert!(!file.exists());

        let outcome = undo.undo_last().await;
        assert!(!outcome.is_failure());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_failed_undo_is_kept_and_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let undo = manager(dir.path()).await;
        let created = dir.path().join("a");
        std::fs::create_dir(&created).unwrap();
        undo.log_operation("create_folder", json!({}), UndoAction::RemoveCreated { paths: vec![created.clone()] }).unwrap();
        let missing = UndoAction::Restore { original: dir.path().join("gone"), trashed: dir.path().join("nowhere") };
        undo.log_operation("delete_file", json!({}), missing).unwrap();

        let outcomes = undo.undo_multiple(3).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_failure());
        assert!(outcomes[0].to_string().starts_with("❌ Undo failed"));
        assert_eq!(undo.len(), 2);
        assert!(created.exists());
    }

    #[tokio::test]
    async fn test_stack_is_capped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let undo = manager(dir.path()).await;
        for i in 0..55 {
            undo.log_operation(&format!("op{}", i), json!({}), UndoAction::ResetCommit { cwd: dir.path().to_path_buf() }).unwrap();
        }
        assert_eq!(undo.len(), MAX_ENTRIES);
        assert_eq!(undo.list_operations(2)[0].operation, "op54");

        let reopened = manager(dir.path()).await;
        assert_eq!(reopened.len(), MAX_ENTRIES);
        assert_eq!(reopened.list_operations(1)[0].operation, "op54");
    }

    #[tokio::test]
    async fn test_trash_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let undo = manager(dir.path()).await;
        for _ in 0..2 {
            let file = dir.path().join("same.txt");
            std::fs::write(&file, "x").unwrap();
            undo.trash(&file).unwrap();
        }
        assert_eq!(std::fs::read_dir(undo.trash_dir()).unwrap().count(), 2);
    }
}
