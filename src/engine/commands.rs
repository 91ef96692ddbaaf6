//! Low-level file commands. Deletions go to the trash so they can be undone.

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::scaffold::create_dir_tracked;
use super::undo::{UndoAction, UndoManager};

pub fn create_folder(path: &Path, undo: &UndoManager) -> Result<String> {
    let created = create_dir_tracked(path)?;
    if created.is_empty() {
        return Ok(format!("ℹ️ Folder already exists at {}", path.display()));
    }
    undo.log_operation("create_folder", json!({"path": path}), UndoAction::RemoveCreated { paths: created })?;
    Ok(format!("📁 Folder created at {}", path.display()))
}

/// Create a file, never overwriting an existing one.
pub fn create_file(path: &Path, content: &str, undo: &UndoManager) -> Result<String> {
    if path.exists() {
        return Ok(format!("ℹ️ File already exists at {}", path.display()));
    }
    let mut created = match path.parent() {
        Some(parent) => create_dir_tracked(parent)?,
        None => Vec::new(),
    };
    std::fs::write(path, content)?;
    created.push(path.to_path_buf());
    undo.log_operation("create_file", json!({"path": path}), UndoAction::RemoveCreated { paths: created })?;
    Ok(format!("📄 File created at {}", path.display()))
}

/// Delete an empty folder.
pub fn delete_folder(path: &Path, undo: &UndoManager) -> Result<String> {
    if !path.is_dir() {
        return Ok(format!("⚠️ Folder does not exist: {}", path.display()));
    }
    if std::fs::read_dir(path)?.next().is_some() {
        return Ok("⚠️ Folder not empty. Use 'force_delete' to remove recursively.".to_string());
    }
    trash_and_log("delete_folder", path, undo)?;
    Ok(format!("🗑️ Folder deleted: {}", path.display()))
}

pub fn delete_file(path: &Path, undo: &UndoManager) -> Result<String> {
    if !path.is_file() {
        return Ok(format!("⚠️ File does not exist: {}", path.display()));
    }
    trash_and_log("delete_file", path, undo)?;
    Ok(format!("🗑️ File deleted: {}", path.display()))
}

/// Delete a file or a folder with everything in it.
pub fn force_delete(path: &Path, undo: &UndoManager) -> Result<String> {
    if !path.exists() {
        return Ok(format!("⚠️ Nothing to delete at {}", path.display()));
    }
    trash_and_log("force_delete", path, undo)?;
    Ok(format!("🗑️ Force deleted: {}", path.display()))
}

fn trash_and_log(operation: &str, path: &Path, undo: &UndoManager) -> Result<()> {
    let trashed = undo.trash(path)?;
    info!("🗑️ {} -> {}", path.display(), trashed.display());
    undo.log_operation(operation, json!({"path": path}), UndoAction::Restore { original: path.to_path_buf(), trashed })
}

/// Run a command given as an `action` name and a target path.
pub fn execute_action(action: &str, path: &Path, undo: &UndoManager) -> Result<String> {
    match action {
        "create_folder" => create_folder(path, undo),
        "create_file" => create_file(path, "", undo),
        "delete_folder" => delete_folder(path, undo),
        "delete_file" => delete_file(path, undo),
        "force_delete" => force_delete(path, undo),
        _ => Ok("⚠️ Unknown command".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    async fn setup() -> (tempfile::TempDir, UndoManager) {
        let dir = tempfile::tempdir().unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), Memory::in_memory().await.unwrap()).unwrap();
        (dir, undo)
    }

    #[tokio::test]
    async fn test_create_file_never_overwrites() {
        let (dir, undo) = setup().await;
        let file = dir.path().join("docs/notes.md");
        assert!(create_file(&file, "first", &undo).unwrap().starts_with("📄"));
        assert!(create_file(&file, "second", &undo).unwrap().starts_with("ℹ️"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "first");

        undo.undo_last().await;
        assert!(!dir.path().join("docs").exists());
    }

    #[tokio::test]
    async fn test_delete_folder_requires_empty() {
        let (dir, undo) = setup().await;
        let folder = dir.path().join("data");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("a.csv"), "1,2").unwrap();

        assert!(delete_folder(&folder, &undo).unwrap().contains("not empty"));
        assert!(folder.exists());

        assert!(force_delete(&folder, &undo).unwrap().starts_with("🗑️"));
        assert!(!folder.exists());
        undo.undo_last().await;
        assert_eq!(std::fs::read_to_string(folder.join("a.csv")).unwrap(), "1,2");
    }

    #[tokio::test]
    async fn test_execute_action_dispatch() {
        let (dir, undo) = setup().await;
        let file = dir.path().join("x.txt");
        execute_action("create_file", &file, &undo).unwrap();
        assert!(execute_action("delete_file", &file, &undo).unwrap().contains("File deleted"));
        assert!(!file.exists());
        assert!(execute_action("delete_file", &file, &undo).unwrap().contains("does not exist"));
        assert_eq!(execute_action("rename", &file, &undo).unwrap(), "⚠️ Unknown command");
    }
}
