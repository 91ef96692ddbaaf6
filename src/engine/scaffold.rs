//! Create a project tree from a blueprint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use super::undo::{UndoAction, UndoManager};
use crate::blueprint::Blueprint;

/// What `apply_blueprint` did on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaffoldReport {
    pub created_dirs: Vec<PathBuf>,
    pub created_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
}

impl ScaffoldReport {
    /// Everything new, parents before children.
    pub fn created(&self) -> Vec<PathBuf> {
        self.created_dirs.iter().chain(&self.created_files).cloned().collect()
    }
}

/// Create `path` and any missing parents, returning the directories that are new.
pub(crate) fn create_dir_tracked(path: &Path) -> Result<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = path.ancestors().take_while(|p| !p.as_os_str().is_empty() && !p.exists()).map(Path::to_path_buf).collect();
    missing.reverse();
    std::fs::create_dir_all(path).with_context(|| format!("Failed to create directory {}", path.display()))?;
    Ok(missing)
}

/// Write the blueprint under `base`.
///
/// Existing files are left untouched. Everything created is logged as one
/// `create_project` operation so a single undo removes the whole tree.
///
/// # Errors
/// Returns an error if the blueprint has unsafe paths or the disk write fails.
pub fn apply_blueprint(base: &Path, blueprint: &Blueprint, undo: &UndoManager) -> Result<ScaffoldReport> {
    let blueprint = blueprint.clone().validate()?;
    let mut report = ScaffoldReport { created_dirs: create_dir_tracked(base)?, ..Default::default() };

    for folder in &blueprint.folders {
        report.created_dirs.extend(create_dir_tracked(&base.join(folder))?);
    }

    for file in &blueprint.files {
        let path = base.join(&file.path);
        if let Some(parent) = path.parent() {
            report.created_dirs.extend(create_dir_tracked(parent)?);
        }
        if path.exists() {
            debug!("Keeping existing file {}", path.display());
            report.skipped_files.push(path);
            continue;
        }
        std::fs::write(&path, &file.content).with_context(|| format!("Failed to write {}", path.display()))?;
        report.created_files.push(path);
    }

    let created = report.created();
    if !created.is_empty() {
        undo.log_operation(
            "create_project",
            json!({"path": base, "folders": report.created_dirs.len(), "files": report.created_files.len()}),
            UndoAction::RemoveCreated { paths: created },
        )?;
    }

    info!("📁 Project ready at {} ({} folders, {} files)", base.display(), report.created_dirs.len(), report.created_files.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::FileEntry;
    use crate::memory::Memory;

    #[tokio::test]
    async fn test_apply_creates_tree_once() {
        let dir = tempfile::tempdir().unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), Memory::in_memory().await.unwrap()).unwrap();
        let base = dir.path().join("shop");
        let blueprint = Blueprint { folders: vec!["src".into()], files: vec![FileEntry::new("src/app/main.py", "print('hi')"), FileEntry::new("README.md", "# Shop")] };

        let report = apply_blueprint(&base, &blueprint, &undo).unwrap();
        assert_eq!(report.created_dirs, vec![base.clone(), base.join("src"), base.join("src/app")]);
        assert_eq!(std::fs::read_to_string(base.join("src/app/main.py")).unwrap(), "print('hi')");
        assert_eq!(undo.len(), 1);

        std::fs::write(base.join("README.md"), "edited").unwrap();
        let again = apply_blueprint(&base, &blueprint, &undo).unwrap();
        assert_eq!(again.skipped_files.len(), 2);
        assert_eq!(std::fs::read_to_string(base.join("README.md")).unwrap(), "edited");
        assert_eq!(undo.len(), 1);
    }

    #[tokio::test]
    async fn test_undo_removes_project() {
        let dir = tempfile::tempdir().unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), Memory::in_memory().await.unwrap()).unwrap();
        let base = dir.path().join("site");
        apply_blueprint(&base, &Blueprint::folders_only(&["css", "js"]), &undo).unwrap();

        assert!(!undo.undo_last().await.is_failure());
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn test_unsafe_blueprint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), Memory::in_memory().await.unwrap()).unwrap();
        assert!(apply_blueprint(&dir.path().join("x"), &Blueprint::folders_only(&["../escape"]), &undo).is_err());
        assert!(!dir.path().join("x").exists());
    }
}
