use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{Memory, now};
use crate::error::Result;

/// Completed actions considered when looking for repeated pairs.
const PATTERN_WINDOW: i64 = 20;

/// Intent (and optionally technology) that fires a learned workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech: Option<String>,
}

/// Workflow learned from a trigger, stored as a `workflow` fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedWorkflow {
    pub id: String,
    pub trigger: WorkflowTrigger,
    pub actions: Vec<String>,
    pub scope: String,
    pub confidence: f64,
    pub enabled: bool,
}

/// Named sequence of steps, stored as a `pipeline` fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub steps: Vec<String>,
    pub scope: String,
    pub enabled: bool,
}

/// Repeated intent pair worth turning into a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSuggestion {
    pub trigger: WorkflowTrigger,
    pub actions: Vec<String>,
    pub confidence: f64,
    pub occurrences: usize,
}

/// A row of the `workflows` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct NamedWorkflow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub steps: String,
    pub created_at: String,
    pub last_used: Option<String>,
    pub use_count: i64,
}

impl NamedWorkflow {
    pub fn steps(&self) -> Vec<String> {
        serde_json::from_str(&self.steps).unwrap_or_default()
    }
}

fn workflow_key(trigger: &WorkflowTrigger, scope: &str) -> String {
    format!("workflow_{}_{}_{}", trigger.intent, trigger.tech.as_deref().unwrap_or("any"), scope)
}

/// Short stable identifier: first 8 hex chars of the trigger hash.
fn workflow_id(trigger: &WorkflowTrigger, scope: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}{}{}", trigger.intent, trigger.tech.as_deref().unwrap_or(""), scope));
    hex::encode(hasher.finalize())[..8].to_string()
}

impl Memory {
    /// Save (or replace) a named workflow.
    pub async fn save_workflow(&self, name: &str, steps: &[String], description: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO workflows (name, description, steps, created_at, use_count) VALUES (?, ?, ?, ?, 0) \
             ON CONFLICT(name) DO UPDATE SET description = excluded.description, steps = excluded.steps",
        )
        .bind(name)
        .bind(description)
        .bind(serde_json::to_string(steps)?)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn workflow(&self, name: &str) -> Result<Option<NamedWorkflow>> {
        let workflow = sqlx::query_as::<_, NamedWorkflow>("SELECT * FROM workflows WHERE name = ?").bind(name).fetch_optional(&self.pool).await?;
        Ok(workflow)
    }

    /// Named workflows, most recently used first.
    pub async fn list_workflows(&self) -> Result<Vec<NamedWorkflow>> {
        let workflows = sqlx::query_as::<_, NamedWorkflow>("SELECT * FROM workflows ORDER BY last_used DESC, use_count DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(workflows)
    }

    /// Steps of a named workflow, recording the use.
    pub async fn execute_workflow(&self, name: &str) -> Result<Option<Vec<String>>> {
        let Some(workflow) = self.workflow(name).await? else {
            return Ok(None);
        };
        sqlx::query("UPDATE workflows SET use_count = use_count + 1, last_used = ? WHERE id = ?")
            .bind(now())
            .bind(workflow.id)
            .execute(&self.pool)
            .await?;
        Ok(Some(workflow.steps()))
    }

    pub async fn delete_workflow(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE name = ?").bind(name).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Learn actions to run after an intent.
    pub async fn remember_workflow(&self, trigger: &WorkflowTrigger, actions: &[String], scope: &str) -> Result<LearnedWorkflow> {
        let workflow = LearnedWorkflow {
            id: workflow_id(trigger, scope),
            trigger: trigger.clone(),
            actions: actions.to_vec(),
            scope: scope.to_string(),
            confidence: 0.9,
            enabled: true,
        };
        let value = serde_json::to_value(&workflow)?;
        self.remember(&workflow_key(trigger, scope), &value, "workflow", Some(&format!("workflow,{}", trigger.intent))).await?;
        Ok(workflow)
    }

    /// Enabled workflows for an intent, highest confidence first.
    ///
    /// Workflows learned without a technology match any technology.
    pub async fn workflows_for_trigger(&self, intent: &str, tech: Option<&str>, scope: &str) -> Result<Vec<LearnedWorkflow>> {
        let mut matches: Vec<LearnedWorkflow> = self
            .recent(50, Some("workflow"))
            .await?
            .iter()
            .filter_map(|fact| serde_json::from_value::<LearnedWorkflow>(fact.json()).ok())
            .filter(|wf| wf.enabled && wf.scope == scope && wf.trigger.intent == intent)
            .filter(|wf| wf.trigger.tech.is_none() || wf.trigger.tech.as_deref() == tech)
            .collect();
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(matches)
    }

    pub async fn disable_workflow(&self, trigger: &WorkflowTrigger, scope: &str) -> Result<bool> {
        self.forget(&workflow_key(trigger, scope)).await
    }

    pub async fn remember_pipeline(&self, name: &str, steps: &[String], scope: &str) -> Result<()> {
        let pipeline = Pipeline { name: name.to_string(), steps: steps.to_vec(), scope: scope.to_string(), enabled: true };
        let value = serde_json::to_value(&pipeline)?;
        self.remember(&format!("pipeline_{}_{}", name, scope), &value, "pipeline", Some("pipeline")).await
    }

    /// Enabled pipeline by name.
    pub async fn pipeline(&self, name: &str, scope: &str) -> Result<Option<Pipeline>> {
        let Some(value) = self.recall(&format!("pipeline_{}_{}", name, scope)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_value::<Pipeline>(value).ok().filter(|p| p.enabled))
    }

    /// Look for an intent that keeps following another one.
    ///
    /// Considers the last `PATTERN_WINDOW` completed actions; a pair of consecutive
    /// successful, different intents seen at least `min_occurrences` times
    /// becomes a suggestion.
    pub async fn detect_repeated_pattern(&self, min_occurrences: usize) -> Result<Option<PatternSuggestion>> {
        let mut history: Vec<(String, bool)> = self
            .recent_events_of("action_completed", PATTERN_WINDOW)
            .await?
            .iter()
            .filter_map(|e| e.intent_name().map(|name| (name, e.success)))
            .collect();
        history.reverse();

        let mut pairs: Vec<((String, String), usize)> = Vec::new();
        for window in history.windows(2) {
            let (earlier, later) = (&window[0], &window[1]);
            if !(earlier.1 && later.1) || earlier.0 == later.0 {
                continue;
            }
            let key = (earlier.0.clone(), later.0.clone());
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => pairs.push((key, 1)),
            }
        }

        let total = history.len().max(1);
        Ok(pairs.into_iter().find(|(_, count)| *count >= min_occurrences).map(|((trigger, follow), count)| PatternSuggestion {
            trigger: WorkflowTrigger { intent: trigger, tech: None },
            actions: vec![follow],
            confidence: count as f64 / total as f64,
            occurrences: count,
        }))
    }
}

/// Parse stored pipeline steps that may arrive as a JSON array or a comma list.
pub fn parse_steps(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        Value::String(s) => s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::intent::{Intent, IntentKind};
    use crate::memory::Event;

    fn trigger(intent: &str, tech: Option<&str>) -> WorkflowTrigger {
        WorkflowTrigger { intent: intent.to_string(), tech: tech.map(str::to_string) }
    }

    #[tokio::test]
    async fn test_named_workflow_lifecycle() {
        let memory = Memory::in_memory().await.unwrap();
        let steps = vec!["git_init".to_string(), "env_create".to_string()];
        memory.save_workflow("bootstrap", &steps, Some("new repo")).await.unwrap();

        assert_eq!(memory.execute_workflow("bootstrap").await.unwrap(), Some(steps));
        assert_eq!(memory.workflow("bootstrap").await.unwrap().unwrap().use_count, 1);
        assert_eq!(memory.list_workflows().await.unwrap().len(), 1);
        assert!(memory.delete_workflow("bootstrap").await.unwrap());
        assert_eq!(memory.execute_workflow("bootstrap").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trigger_workflows_match_tech() {
        let memory = Memory::in_memory().await.unwrap();
        let learned = memory.remember_workflow(&trigger("create_flask_project", Some("flask")), &["git_init".to_string()], "global").await.unwrap();
        memory.remember_workflow(&trigger("create_flask_project", None), &["env_create".to_string()], "global").await.unwrap();
        assert_eq!(learned.id.len(), 8);

        assert_eq!(memory.workflows_for_trigger("create_flask_project", Some("flask"), "global").await.unwrap().len(), 2);
        assert_eq!(memory.workflows_for_trigger("create_flask_project", Some("django"), "global").await.unwrap().len(), 1);
        assert!(memory.workflows_for_trigger("create_flask_project", None, "project").await.unwrap().is_empty());

        assert!(memory.disable_workflow(&trigger("create_flask_project", None), "global").await.unwrap());
        assert_eq!(memory.workflows_for_trigger("create_flask_project", Some("django"), "global").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_round_trip() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember_pipeline("ship", &["git_commit".to_string(), "git_push".to_string()], "global").await.unwrap();
        let pipeline = memory.pipeline("ship", "global").await.unwrap().unwrap();
        assert_eq!(pipeline.steps, vec!["git_commit", "git_push"]);
        assert!(memory.pipeline("ship", "project").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detects_repeated_pair() {
        let memory = Memory::in_memory().await.unwrap();
        for _ in 0..3 {
            memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::CreateFlaskProject))).await.unwrap();
            memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::GitInit))).await.unwrap();
        }

        let suggestion = memory.detect_repeated_pattern(3).await.unwrap().unwrap();
        assert_eq!(suggestion.trigger.intent, "create_flask_project");
        assert_eq!(suggestion.actions, vec!["git_init"]);
        assert_eq!(suggestion.occurrences, 3);
        assert!((suggestion.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pattern_ignores_interleaved_events() {
        let memory = Memory::in_memory().await.unwrap();
        let state = |from: &str, to: &str| Event::new("state_change").data(json!({"from": from, "to": to}));
        for _ in 0..4 {
            for kind in [IntentKind::CreateFlaskProject, IntentKind::GitInit] {
                memory.log_event(Event::new("voice_command").data(json!({"command": kind.as_str()}))).await.unwrap();
                memory.log_event(state("idle", "listening")).await.unwrap();
                memory.log_event(state("listening", "thinking")).await.unwrap();
                memory.log_event(state("thinking", "executing")).await.unwrap();
                memory.log_event(Event::new("action_completed").intent(&Intent::of(kind))).await.unwrap();
                memory.log_event(state("executing", "idle")).await.unwrap();
            }
        }

        let suggestion = memory.detect_repeated_pattern(3).await.unwrap().unwrap();
        assert_eq!(suggestion.trigger.intent, "create_flask_project");
        assert_eq!(suggestion.actions, vec!["git_init"]);
        assert_eq!(suggestion.occurrences, 4);
    }

    #[test]
    fn test_parse_steps_accepts_lists_and_text() {
        assert_eq!(parse_steps(&json!(["a", " b "])), vec!["a", "b"]);
        assert_eq!(parse_steps(&json!("a, b,")), vec!["a", "b"]);
        assert!(parse_steps(&json!(3)).is_empty());
    }
}
