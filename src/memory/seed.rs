use serde_json::{Value, json};
use tracing::info;

use super::{Memory, MemoryStats, SafetyAction};
use crate::error::Result;

impl Memory {
    /// Seed default preferences, safety rules, facts, tips and known error fixes.
    ///
    /// Safe to run repeatedly: every write is an upsert.
    ///
    /// # Arguments
    /// * `project_location` - Default base directory for new projects
    pub async fn initialize_defaults(&self, project_location: &str) -> Result<MemoryStats> {
        info!("🧠 Initializing VAL memory...");

        let preferences: [(&str, Value, &str); 11] = [
            ("default_project_location", json!(project_location), "path"),
            ("preferred_theme", json!("dark"), "ui"),
            ("ask_confirmation", json!(true), "safety"),
            ("auto_open_project", json!(false), "behavior"),
            ("wake_word_enabled", json!(true), "voice"),
            ("push_to_talk", json!(false), "voice"),
            ("confidence_threshold", json!(0.75), "voice"),
            ("log_audio", json!(false), "voice"),
            ("vad_aggressiveness", json!(1), "voice"),
            ("auto_apply_workflows", json!(true), "workflow"),
            ("passive_learning", json!(false), "workflow"),
        ];
        for (key, value, category) in &preferences {
            self.set_preference(key, value, category).await?;
        }

        let rules = [
            ("workflow_action", "git reset", SafetyAction::Confirm, "Git history change"),
            ("workflow_action", "delete", SafetyAction::Confirm, "Destructive file op"),
            ("workflow_action", "docker build", SafetyAction::Allow, "Container automation"),
            ("git_destructive", "reset --hard", SafetyAction::Confirm, "Irreversible history loss"),
            ("git_destructive", "push --force", SafetyAction::Confirm, "Overwrites remote history"),
            ("git_destructive", "rm --cached", SafetyAction::Allow, "Safe untrack"),
        ];
        for (rule_type, pattern, action, reason) in rules {
            self.add_safety_rule(rule_type, pattern, action, reason).await?;
        }

        self.remember(
            "val_purpose",
            &json!("VAL is a local autonomous operator that helps with project creation and file management."),
            "fact",
            None,
        )
        .await?;
        self.remember("user_role", &json!("developer/creator"), "fact", Some("user,role")).await?;
        self.remember(
            "tip_voice_commands",
            &json!("Say 'Hey VAL' to wake me up, then give commands like 'create a Flask project' or 'open last project'."),
            "tip",
            None,
        )
        .await?;
        self.remember(
            "tip_memory",
            &json!("I remember your projects and preferences. Ask me to 'list projects' or 'recall my default path'."),
            "tip",
            None,
        )
        .await?;

        self.remember_error_fix("connection refused", "Make sure Ollama is running with 'ollama serve'.").await?;
        self.remember_error_fix("is it installed", "Install the missing tool and make sure it is on your PATH.").await?;
        self.remember_error_fix("permission denied", "Check folder permissions or choose a location inside your home directory.").await?;

        let stats = self.stats().await?;
        info!("✅ Memory initialized: {} entries, {} safety rules, {} preferences", stats.facts, stats.safety_rules, stats.preferences);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let memory = Memory::in_memory().await.unwrap();
        let first = memory.initialize_defaults("/home/dev/Projects").await.unwrap();
        let second = memory.initialize_defaults("/home/dev/Projects").await.unwrap();

        assert_eq!(first.preferences, 11);
        assert_eq!(first.safety_rules, 19);
        assert_eq!(second.safety_rules, first.safety_rules);
        assert_eq!(second.error_fixes, 3);
        assert_eq!(memory.preference("confidence_threshold").await.unwrap(), Some(json!(0.75)));
    }
}
