use serde::Serialize;
use serde_json::Value;

use super::facts::decode_value;
use super::{Memory, now};
use crate::error::Result;

/// A row of the `goals` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Goal {
    pub id: i64,
    pub description: String,
    pub priority: i64,
    pub status: String,
    pub success_criteria: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row of the `triggers` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Trigger {
    pub id: i64,
    pub trigger_type: String,
    pub condition: String,
    pub action: String,
    pub confidence: f64,
    pub enabled: bool,
    pub created_at: String,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub facts: i64,
    pub events: i64,
    pub projects: i64,
    pub preferences: i64,
    pub safety_rules: i64,
    pub workflows: i64,
    pub goals: i64,
    pub error_fixes: i64,
}

impl Memory {
    /// Remember how an error was fixed. Repeats raise confidence.
    pub async fn remember_error_fix(&self, error_pattern: &str, fix_action: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO error_fixes (error_pattern, fix_action, confidence, created_at) VALUES (?, ?, 0.8, ?) \
             ON CONFLICT(error_pattern) DO UPDATE SET fix_action = excluded.fix_action, \
             confidence = MIN(1.0, error_fixes.confidence + 0.1)",
        )
        .bind(error_pattern)
        .bind(fix_action)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most confident fix whose pattern occurs in the error text.
    pub async fn error_fix(&self, error_text: &str) -> Result<Option<String>> {
        let fixes: Vec<(String, String)> =
            sqlx::query_as("SELECT error_pattern, fix_action FROM error_fixes ORDER BY confidence DESC, id").fetch_all(&self.pool).await?;
        let error_text = error_text.to_lowercase();
        Ok(fixes.into_iter().find(|(pattern, _)| error_text.contains(&pattern.to_lowercase())).map(|(_, fix)| fix))
    }

    pub async fn add_goal(&self, description: &str, priority: i64, success_criteria: Option<&str>) -> Result<i64> {
        let stamp = now();
        let result = sqlx::query("INSERT INTO goals (description, priority, status, success_criteria, created_at, updated_at) VALUES (?, ?, 'active', ?, ?, ?)")
            .bind(description)
            .bind(priority)
            .bind(success_criteria)
            .bind(&stamp)
            .bind(&stamp)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Active goals, highest priority first.
    pub async fn active_goals(&self) -> Result<Vec<Goal>> {
        let goals = sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE status = 'active' ORDER BY priority DESC, id").fetch_all(&self.pool).await?;
        Ok(goals)
    }

    pub async fn update_goal_status(&self, goal_id: i64, status: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE goals SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now())
            .bind(goal_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_trigger(&self, trigger_type: &str, condition: &str, action: &str, confidence: f64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO triggers (trigger_type, condition, action, confidence, enabled, created_at) VALUES (?, ?, ?, ?, 1, ?)")
            .bind(trigger_type)
            .bind(condition)
            .bind(action)
            .bind(confidence)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Enabled triggers, optionally of one type.
    pub async fn triggers(&self, trigger_type: Option<&str>) -> Result<Vec<Trigger>> {
        let triggers = sqlx::query_as::<_, Trigger>("SELECT * FROM triggers WHERE enabled = 1 AND (? IS NULL OR trigger_type = ?) ORDER BY confidence DESC, id")
            .bind(trigger_type)
            .bind(trigger_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(triggers)
    }

    /// Store the latest observed state of a project.
    pub async fn update_project_state(&self, project_path: &str, state: &Value) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO project_state (project_path, state_json, last_updated) VALUES (?, ?, ?)")
            .bind(project_path)
            .bind(state.to_string())
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn project_state(&self, project_path: &str) -> Result<Option<Value>> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state_json FROM project_state WHERE project_path = ?").bind(project_path).fetch_optional(&self.pool).await?;
        Ok(state.as_deref().map(decode_value))
    }

    pub async fn log_reflection(&self, insight: &str, action_taken: Option<&str>, effectiveness: Option<f64>) -> Result<()> {
        sqlx::query("INSERT INTO self_reflections (insight, action_taken, effectiveness, created_at) VALUES (?, ?, ?, ?)")
            .bind(insight)
            .bind(action_taken)
            .bind(effectiveness)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a user reaction to an action (`cancel`, `undo`, ...).
    pub async fn log_feedback(&self, action_id: &str, signal: &str, weight: f64) -> Result<()> {
        sqlx::query("INSERT INTO feedback (action_id, signal, weight, created_at) VALUES (?, ?, ?, ?)")
            .bind(action_id)
            .bind(signal)
            .bind(weight)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table)).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        Ok(MemoryStats {
            facts: self.count("memory").await?,
            events: self.count("events").await?,
            projects: self.count("projects").await?,
            preferences: self.count("preferences").await?,
            safety_rules: self.count("safety_rules").await?,
            workflows: self.count("workflows").await?,
            goals: self.count("goals").await?,
            error_fixes: self.count("error_fixes").await?,
        })
    }
}
