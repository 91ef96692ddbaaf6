use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use super::governor::{ActionKind, Governor};
use super::thoughts::ThoughtLog;
use crate::engine::Router;
use crate::intent::{Intent, IntentKind};
use crate::memory::{Event, Goal, Memory, ProjectRecord, SafetyAction};
use crate::session::SharedSession;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// What the agent saw during one tick.
#[derive(Debug, Default)]
pub struct Observation {
    pub file_changed: bool,
    pub goals: Vec<Goal>,
    pub last_project: Option<ProjectRecord>,
}

/// Observe, decide, act loop driven by the daemon.
pub struct AutonomousAgent {
    router: Router,
    memory: Memory,
    session: SharedSession,
    governor: Governor,
    thoughts: ThoughtLog,
    last_tick: Option<Instant>,
}

/// Intent for a trigger action: inline JSON or a pipeline name.
fn action_intent(action: &str) -> Option<Intent> {
    let action = action.trim();
    let intent = if action.starts_with('{') {
        match serde_json::from_str(action) {
            Ok(value) => Intent::from_value(value),
            Err(e) => {
                warn!("Ignoring malformed trigger action {}: {}", action, e);
                return None;
            }
        }
    } else if action.is_empty() {
        return None;
    } else {
        Intent::of(IntentKind::ExecutePipeline).with_name(action)
    };
    Some(intent.with_source("agent"))
}

impl AutonomousAgent {
    pub fn new(router: Router, memory: Memory, session: SharedSession) -> Self {
        let thoughts = ThoughtLog::new(memory.clone());
        Self { router, memory, session, governor: Governor::new(), thoughts, last_tick: None }
    }

    /// Run one cycle unless the previous one was less than five seconds ago.
    /// Returns the results of the actions taken.
    pub async fn tick(&mut self) -> anyhow::Result<Vec<String>> {
        let now = Instant::now();
        if let Some(last) = self.last_tick
            && now.duration_since(last) < TICK_INTERVAL
        {
            return Ok(Vec::new());
        }
        self.last_tick = Some(now);

        let observation = self.observe().await?;
        let actions = self.decide(&observation).await?;
        let mut results = Vec::new();
        for action in actions {
            if let Some(result) = self.act(&action).await? {
                results.push(result);
            }
        }
        Ok(results)
    }

    pub async fn observe(&self) -> anyhow::Result<Observation> {
        let file_changed = {
            let mut session = self.session.lock();
            session.agent_ticks += 1;
            std::mem::take(&mut session.project_changed)
        };
        let observation = Observation {
            file_changed,
            goals: self.memory.active_goals().await?,
            last_project: self.memory.last_project().await?,
        };
        debug!(
            "Agent observed: changed={}, {} goals, project={:?}",
            observation.file_changed,
            observation.goals.len(),
            observation.last_project.as_ref().map(|p| &p.name)
        );
        Ok(observation)
    }

    /// Actions of enabled `event` triggers that fire on file changes.
    pub async fn decide(&self, observation: &Observation) -> anyhow::Result<Vec<String>> {
        if !observation.file_changed {
            return Ok(Vec::new());
        }
        let actions = self
            .memory
            .triggers(Some("event"))
            .await?
            .into_iter()
            .filter(|t| t.enabled && t.condition == "file_changed")
            .map(|t| t.action)
            .collect();
        Ok(actions)
    }

    async fn act(&mut self, action: &str) -> anyhow::Result<Option<String>> {
        let Some(intent) = action_intent(action) else {
            return Ok(None);
        };

        if !self.governor.check(ActionKind::classify(&intent)) {
            warn!("🛑 Governor blocked action: {}", action);
            self.memory.log_event(Event::new("governor_block").data(json!({"intent": intent}))).await?;
            self.thoughts.log_criticism(&format!("Governor blocked {}", action), "high", Some("Wait for the hourly budget to reset")).await?;
            return Ok(None);
        }

        let verdict = self.memory.check_safety(&intent, action, intent.path.as_deref()).await?;
        if verdict.action != SafetyAction::Allow {
            let result = format!("Skipped {}: needs a person to confirm ({})", action, verdict.reason);
            self.memory.log_event(Event::new("agent_failure").intent(&intent).result(result.as_str()).success(false)).await?;
            return Ok(Some(result));
        }

        info!("🤖 Agent executing: {}", intent.kind_name());
        self.thoughts
            .log_decision(&format!("Run {}", action), "A file_changed trigger fired", &[action.to_string()], 0)
            .await?;

        let (success, result) = match self.router.route(&intent).await {
            Ok(outcome) => (outcome.is_success(), outcome.message().to_string()),
            Err(e) => (false, format!("{:#}", e)),
        };
        let event_type = if success { "agent_success" } else { "agent_failure" };
        self.memory
            .log_event(Event::new(event_type).intent(&intent).result(result.as_str()).success(success))
            .await?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::UndoManager;
    use crate::llm::LlmClient;
    use crate::session;

    async fn agent(dir: &std::path::Path) -> (AutonomousAgent, Memory, SharedSession) {
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        let undo = Arc::new(UndoManager::open(&dir.join("logs"), memory.clone()).unwrap());
        let router = Router::new(memory.clone(), session.clone(), undo, Arc::new(LlmClient::offline()), dir.to_path_buf());
        (AutonomousAgent::new(router, memory.clone(), session.clone()), memory, session)
    }

    #[test]
    fn test_action_intent() {
        assert_eq!(action_intent("tests").unwrap().arg("name").as_deref(), Some("tests"));
        assert!(action_intent(r#"{"intent": "quick_health"}"#).unwrap().is(&IntentKind::QuickHealth));
        assert!(action_intent("{broken").is_none());
        assert!(action_intent("  ").is_none());
    }

    #[tokio::test]
    async fn test_idle_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, memory, session) = agent(dir.path()).await;
        memory.add_trigger("event", "file_changed", "{\"intent\": \"status\"}", 0.8).await.unwrap();

        assert!(agent.tick().await.unwrap().is_empty());
        assert_eq!(session.lock().agent_ticks, 1);
        // Second tick inside the interval does nothing
        session.lock().project_changed = true;
        assert!(agent.tick().await.unwrap().is_empty());
        assert_eq!(session.lock().agent_ticks, 1);
    }

    #[tokio::test]
    async fn test_trigger_fires_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, memory, session) = agent(dir.path()).await;
        memory.add_trigger("event", "file_changed", "{\"intent\": \"status\"}", 0.8).await.unwrap();
        memory.add_trigger("event", "file_changed", "missing_pipeline", 0.8).await.unwrap();
        session.lock().project_changed = true;

        let results = agent.tick().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.starts_with("✅ VAL is running")));
        assert!(!session.lock().project_changed);

        let events: Vec<String> = memory.recent_events(10).await.unwrap().into_iter().map(|e| e.event_type).collect();
        assert!(events.contains(&"agent_success".to_string()));
        assert!(events.contains(&"agent_failure".to_string()));
        assert_eq!(memory.recent(10, Some("cognition")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_governor_blocks_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut agent, memory, _) = agent(dir.path()).await;
        let target = dir.path().join("gone.txt");
        std::fs::write(&target, "x").unwrap();
        let delete = json!({"intent": "delete_file", "path": target}).to_string();
        for _ in 0..3 {
            let result = agent.act(&delete).await.unwrap();
            assert!(result.is_none_or(|r| r.starts_with("Skipped")));
        }
        assert!(target.exists());
        let blocked = memory.recent_events(10).await.unwrap().iter().filter(|e| e.event_type == "governor_block").count();
        assert_eq!(blocked, 1);
    }
}
