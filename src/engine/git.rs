//! Git helpers with a safety review for destructive commands.

use std::path::Path;

use anyhow::{Result, bail};
use serde_json::json;
use tracing::warn;

use super::process::Cmd;
use super::undo::{UndoAction, UndoManager};
use crate::memory::{Event, Memory, RiskLevel, SafetyAction};

/// Fragments that make a git command destructive.
const DESTRUCTIVE: &[&str] = &["reset", "rebase", "rm", "--force"];

/// Decision for a git command before it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GitReview {
    Allow,
    Confirm { question: String, level: RiskLevel },
    Deny(String),
}

pub fn is_destructive(args: &[&str]) -> bool {
    args.iter().any(|arg| DESTRUCTIVE.contains(arg))
}

/// Check a destructive command against the `git_destructive` rules, then the
/// generic `dangerous_action` ones.
pub async fn review(memory: &Memory, args: &[&str]) -> Result<GitReview> {
    if !is_destructive(args) {
        return Ok(GitReview::Allow);
    }

    let command = args.join(" ");
    let verdict = match memory.check_rule("git_destructive", &command).await? {
        Some(verdict) => Some(verdict),
        None => memory.check_rule("dangerous_action", &command).await?,
    };

    Ok(match verdict {
        Some(v) if v.action == SafetyAction::Deny => GitReview::Deny(v.reason),
        Some(v) if v.action == SafetyAction::Confirm => {
            GitReview::Confirm { question: format!("Destructive Git: git {}. {}", command, v.reason), level: v.level }
        }
        Some(_) => GitReview::Allow,
        None => GitReview::Confirm { question: format!("Destructive Git: git {}", command), level: RiskLevel::Dangerous },
    })
}

/// Run `git <args>` in `cwd`, logging `git_executed` or `git_failed`.
///
/// # Errors
/// Returns an error carrying git's stderr if the command fails.
pub async fn run(memory: &Memory, args: &[&str], cwd: &Path) -> Result<String> {
    let command = args.join(" ");
    let result = Cmd::new("git").args(args).dir(cwd).allow_fail().run().await?;

    let event = if result.success() {
        Event::new("git_executed").data(json!({"command": args, "cwd": cwd, "success": true}))
    } else {
        Event::new("git_failed").data(json!({"command": args, "error": result.stderr_trimmed()})).success(false)
    };
    if let Err(e) = memory.log_event(event).await {
        warn!("Failed to log git command: {}", e);
    }

    if !result.success() {
        bail!("Git failed: {}", result.stderr_trimmed());
    }
    let output = match result.stdout_trimmed() {
        "" => "Done.",
        out => out,
    };
    Ok(format!("✅ Git: {}\n{}", command, output))
}

pub async fn init(memory: &Memory, cwd: &Path, remote: Option<&str>) -> Result<String> {
    let mut output = run(memory, &["init"], cwd).await?;
    if let Some(remote) = remote {
        output.push('\n');
        output.push_str(&run(memory, &["remote", "add", "origin", remote], cwd).await?);
    }
    Ok(output)
}

/// Stage everything and commit. The commit can be undone with a soft reset.
pub async fn commit(memory: &Memory, cwd: &Path, message: &str, undo: &UndoManager) -> Result<String> {
    let added = run(memory, &["add", "."], cwd).await?;
    let committed = run(memory, &["commit", "-m", message], cwd).await?;
    undo.log_operation("git_commit", json!({"message": message, "cwd": cwd}), UndoAction::ResetCommit { cwd: cwd.to_path_buf() })?;
    Ok(format!("{}\n{}", added, committed))
}

pub async fn branch(memory: &Memory, cwd: &Path, name: &str) -> Result<String> {
    run(memory, &["checkout", "-b", name], cwd).await
}

/// Arguments for pushing the current branch.
pub fn push_args(remote: &str, force: bool) -> Vec<&str> {
    let mut args = vec!["push", remote, "HEAD"];
    if force {
        args.push("--force");
    }
    args
}

pub async fn push(memory: &Memory, cwd: &Path, remote: &str, force: bool) -> Result<String> {
    run(memory, &push_args(remote, force), cwd).await
}

pub const UNDO_COMMIT_ARGS: [&str; 3] = ["reset", "--soft", "HEAD~1"];

pub async fn undo_last_commit(memory: &Memory, cwd: &Path) -> Result<String> {
    run(memory, &UNDO_COMMIT_ARGS, cwd).await
}

pub async fn status(cwd: &Path) -> Result<String> {
    let result = Cmd::new("git").arg("status").dir(cwd).allow_fail().run().await?;
    Ok(format!("📊 Git Status:\n{}", if result.success() { result.stdout_trimmed() } else { result.stderr_trimmed() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::process;

    #[test]
    fn test_destructive_detection() {
        assert!(is_destructive(&UNDO_COMMIT_ARGS));
        assert!(is_destructive(&push_args("origin", true)));
        assert!(!is_destructive(&push_args("origin", false)));
        assert!(!is_destructive(&["commit", "-m", "reset the form"]));
    }

    #[tokio::test]
    async fn test_review_uses_rules() {
        let memory = Memory::in_memory().await.unwrap();
        assert_eq!(review(&memory, &["status"]).await.unwrap(), GitReview::Allow);

        // Seeded dangerous_action "force" asks for confirmation
        let forced = review(&memory, &push_args("origin", true)).await.unwrap();
        assert!(matches!(forced, GitReview::Confirm { level: RiskLevel::Critical, .. }));

        memory.add_safety_rule("git_destructive", "reset --soft", SafetyAction::Deny, "Team policy").await.unwrap();
        assert_eq!(review(&memory, &UNDO_COMMIT_ARGS).await.unwrap(), GitReview::Deny("Team policy".to_string()));

        memory.add_safety_rule("git_destructive", "rm --cached", SafetyAction::Allow, "Safe untrack").await.unwrap();
        assert_eq!(review(&memory, &["rm", "--cached", "a.txt"]).await.unwrap(), GitReview::Allow);
    }

    #[tokio::test]
    async fn test_init_commit_and_undo() {
        if !process::exists("git") {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::in_memory().await.unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), memory.clone()).unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir(&repo).unwrap();

        init(&memory, &repo, None).await.unwrap();
        for (key, value) in [("user.email", "dev@example.com"), ("user.name", "Dev")] {
            run(&memory, &["config", key, value], &repo).await.unwrap();
        }
        std::fs::write(repo.join("a.txt"), "a").unwrap();
        commit(&memory, &repo, "first", &undo).await.unwrap();
        std::fs::write(repo.join("b.txt"), "b").unwrap();
        commit(&memory, &repo, "second", &undo).await.unwrap();

        assert!(!undo.undo_last().await.is_failure());
        let log = run(&memory, &["log", "--oneline"], &repo).await.unwrap();
        assert!(log.contains("first"));
        assert!(!log.contains("second"));
        assert!(status(&repo).await.unwrap().starts_with("📊 Git Status:"));
    }

    #[tokio::test]
    async fn test_failure_is_logged() {
        if !process::exists("git") {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::in_memory().await.unwrap();
        let err = branch(&memory, dir.path(), "feature").await.unwrap_err();
        assert!(err.to_string().starts_with("Git failed"));
        assert_eq!(memory.recent_events(1).await.unwrap()[0].event_type, "git_failed");
    }
}
