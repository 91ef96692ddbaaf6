//! Self-improvement pass: observe recent events, adjust preferences and
//! learn workflows.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::memory::{EventRecord, Memory};
use crate::session::{DEFAULT_CONFIDENCE_THRESHOLD, SharedSession};

/// Completed actions each heuristic looks at.
const WINDOW: i64 = 20;
const UNDO_LIMIT: usize = 3;
const PATTERN_MIN_OCCURRENCES: usize = 3;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Threshold change for a success rate, if any.
fn tuned_threshold(success_rate: f64, current: f64) -> Option<f64> {
    if success_rate > 0.9 && current > 0.6 {
        Some(round2(current - 0.01))
    } else if success_rate < 0.7 && current < 0.95 {
        Some(round2(current + 0.02))
    } else {
        None
    }
}

pub struct SelfImprover {
    memory: Memory,
    session: SharedSession,
}

impl SelfImprover {
    pub fn new(memory: Memory, session: SharedSession) -> Self {
        Self { memory, session }
    }

    /// Run one pass and describe what changed.
    pub async fn run(&self) -> Result<Vec<String>> {
        info!("🧠 Running self-improver...");
        let actions = self.memory.recent_events_of("action_completed", WINDOW).await?;
        let mut applied = Vec::new();

        let undo_count = actions
            .iter()
            .filter(|e| matches!(e.intent_name().as_deref(), Some("undo" | "undo_multiple")))
            .count();
        if undo_count >= UNDO_LIMIT {
            let current = self.session.lock().voice.confidence_threshold;
            let raised = round2((current + 0.05).min(0.95));
            self.set_threshold(raised).await?;
            self.memory
                .log_reflection("Adjusted preference", Some(&format!("Set confidence_threshold to {}", raised)), Some(0.9))
                .await?;
            applied.push(format!("High undo rate: confidence threshold raised to {}", raised));
        }

        if let Some(pattern) = self.memory.detect_repeated_pattern(PATTERN_MIN_OCCURRENCES).await? {
            self.memory.remember_workflow(&pattern.trigger, &pattern.actions, "global").await?;
            let summary = format!("Automated {} -> {}", pattern.trigger.intent, pattern.actions.join(", "));
            self.memory.log_reflection("Created workflow from pattern", Some(&summary), Some(0.8)).await?;
            applied.push(summary);
        }

        if let Some(change) = self.tune_confidence(&actions).await? {
            applied.push(change);
        }

        for change in &applied {
            info!("🧠 Self-improvement: {}", change);
        }
        Ok(applied)
    }

    async fn tune_confidence(&self, actions: &[EventRecord]) -> Result<Option<String>> {
        if actions.is_empty() {
            return Ok(None);
        }
        let success_rate = actions.iter().filter(|e| e.success).count() as f64 / actions.len() as f64;

        let current = self
            .memory
            .preference("confidence_threshold")
            .await?
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        let Some(tuned) = tuned_threshold(success_rate, current) else {
            return Ok(None);
        };

        self.set_threshold(tuned).await?;
        let change = format!("Changed from {} to {}", current, tuned);
        self.memory.log_reflection("Confidence Auto-Tune", Some(&change), Some(1.0)).await?;
        Ok(Some(format!("Confidence auto-tune: {}", change)))
    }

    async fn set_threshold(&self, value: f64) -> Result<()> {
        self.memory.set_preference("confidence_threshold", &json!(value), "adaptive").await?;
        self.session.lock().voice.confidence_threshold = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, IntentKind};
    use crate::memory::Event;
    use crate::session;

    #[test]
    fn test_tuning_rules() {
        assert_eq!(tuned_threshold(0.95, 0.75), Some(0.74));
        assert_eq!(tuned_threshold(0.95, 0.6), None);
        assert_eq!(tuned_threshold(0.5, 0.75), Some(0.77));
        assert_eq!(tuned_threshold(0.5, 0.95), None);
        assert_eq!(tuned_threshold(0.8, 0.75), None);
    }

    #[tokio::test]
    async fn test_frequent_undo_raises_threshold() {
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        for _ in 0..3 {
            memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::Undo))).await.unwrap();
        }
        // One failure keeps the success rate between the tuning bands
        for _ in 0..2 {
            memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::Help))).await.unwrap();
        }
        memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::Help)).success(false)).await.unwrap();

        let applied = SelfImprover::new(memory.clone(), session.clone()).run().await.unwrap();
        assert_eq!(applied, ["High undo rate: confidence threshold raised to 0.8"]);
        assert_eq!(memory.preference("confidence_threshold").await.unwrap(), Some(json!(0.8)));
        assert_eq!(session.lock().voice.confidence_threshold, 0.8);
    }

    #[tokio::test]
    async fn test_tuning_counts_completed_actions_only() {
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        for success in [true, false, true, false] {
            memory.log_event(Event::new("action_completed").intent(&Intent::of(IntentKind::Help)).success(success)).await.unwrap();
        }
        for _ in 0..30 {
            memory.log_event(Event::new("state_change")).await.unwrap();
        }

        let applied = SelfImprover::new(memory.clone(), session).run().await.unwrap();
        assert_eq!(applied, ["Confidence auto-tune: Changed from 0.75 to 0.77"]);
        assert_eq!(memory.preference("confidence_threshold").await.unwrap(), Some(json!(0.77)));
    }

    #[tokio::test]
    async fn test_repeated_pattern_becomes_workflow() {
        let memory = Memory::in_memory().await.unwrap();
        for _ in 0..3 {
            for kind in [IntentKind::CreateReactProject, IntentKind::GitInit] {
                memory.log_event(Event::new("action_completed").intent(&Intent::of(kind))).await.unwrap();
            }
        }

        let applied = SelfImprover::new(memory.clone(), session::shared()).run().await.unwrap();
        assert!(applied.contains(&"Automated create_react_project -> git_init".to_string()));
        let learned = memory.workflows_for_trigger("create_react_project", None, "global").await.unwrap();
        assert_eq!(learned[0].actions, ["git_init"]);
    }
}
