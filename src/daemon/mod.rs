//! The always-on assistant.
//!
//! [`Daemon::run`] loops listen, extract, decide and execute until the user
//! says stop, the input closes or the cancellation token fires. Background
//! work (agent ticks, self-improvement) runs between utterances.

mod dialogue;
pub mod status;
mod watcher;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use dialogue::Dialogue;
pub use watcher::ProjectWatcher;

use crate::agent::{AutonomousAgent, SelfImprover};
use crate::engine::{Outcome, PlanReview, Router};
use crate::intent::{Intent, IntentExtractor, IntentKind};
use crate::memory::{Event, Memory};
use crate::session::{DialogueState, SharedSession, VoiceMode};
use crate::voice::{Heard, ListenMode, Voice};

/// Self-improvement runs once every this many actions.
const IMPROVE_EVERY: u64 = 10;
/// Times a follow-up must be seen before automating it is offered.
const PATTERN_MIN_OCCURRENCES: usize = 3;
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Intents that end up in a workflow being recorded.
fn recordable(intent: &Intent) -> bool {
    match intent.intent.as_ref() {
        Some(kind) => !matches!(kind, IntentKind::StartWorkflow | IntentKind::StopWorkflow | IntentKind::Stop),
        None => false,
    }
}

pub struct Daemon<V> {
    voice: V,
    memory: Memory,
    session: SharedSession,
    router: Router,
    extractor: IntentExtractor,
    dialogue: Dialogue,
    agent: AutonomousAgent,
    improver: SelfImprover,
    cancel: CancellationToken,
    /// Patterns already offered for automation this run.
    offered: HashSet<String>,
}

impl<V: Voice> Daemon<V> {
    pub fn new(voice: V, memory: Memory, session: SharedSession, router: Router, extractor: IntentExtractor, cancel: CancellationToken) -> Self {
        Self {
            dialogue: Dialogue::new(memory.clone(), session.clone()),
            agent: AutonomousAgent::new(router.clone(), memory.clone(), session.clone()),
            improver: SelfImprover::new(memory.clone(), session.clone()),
            voice,
            memory,
            session,
            router,
            extractor,
            cancel,
            offered: HashSet::new(),
        }
    }

    /// Run until stopped.
    ///
    /// # Errors
    /// Returns an error only if startup fails; errors inside the loop are
    /// logged, spoken and recovered from.
    pub async fn run(&mut self) -> Result<()> {
        self.load_preferences().await?;
        self.memory.log_event(Event::new("system_start")).await?;
        info!("🚀 VAL daemon started");

        let watcher = ProjectWatcher::new(self.memory.clone(), self.session.clone()).spawn(self.cancel.child_token());
        self.voice.speak("VAL is running").await?;

        while !self.cancel.is_cancelled() {
            match self.cycle().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => self.recover(e).await,
            }
        }

        watcher.abort();
        if let Err(e) = self.memory.log_event(Event::new("system_stop")).await {
            warn!("Failed to log shutdown: {}", e);
        }
        info!("👋 VAL daemon stopped");
        Ok(())
    }

    async fn load_preferences(&mut self) -> Result<()> {
        let preferences = self.memory.all_preferences().await?;
        let whisper = preferences.get("voice_mode").and_then(|v| v.as_str()) == Some("whisper");
        let mut session = self.session.lock();
        session.apply_preferences(preferences);
        if whisper {
            session.voice_mode = VoiceMode::Whisper;
        }
        debug!("Loaded {} preferences", session.preferences.len());
        Ok(())
    }

    fn sync_voice_mode(&mut self) {
        let mode = self.session.lock().voice_mode;
        self.voice.set_mode(mode);
    }

    async fn cycle(&mut self) -> Result<Flow> {
        self.background().await?;
        self.sync_voice_mode();

        let mode = if self.dialogue.awaiting_reply() { ListenMode::FollowUp } else { ListenMode::Command };
        let heard = tokio::select! {
            heard = self.voice.listen(mode) => heard?,
            _ = self.cancel.cancelled() => return Ok(Flow::Stop),
        };
        let text = match heard {
            Heard::Text(text) => text,
            Heard::Silence => {
                if mode == ListenMode::FollowUp {
                    self.dialogue.cancel_on_silence(&mut self.voice).await?;
                }
                return Ok(Flow::Continue);
            }
            Heard::Closed => {
                info!("Input closed");
                return Ok(Flow::Stop);
            }
        };

        info!("🗣️ Voice command: {}", text);
        self.memory.log_event(Event::new("voice_command").data(json!({"command": text}))).await?;
        let intent = self.extractor.extract(&text).await;
        match self.dialogue.handle(&mut self.voice, intent).await? {
            Some(intent) => self.execute(intent).await,
            None => Ok(Flow::Continue),
        }
    }

    /// Agent tick and, every few actions, a self-improvement pass.
    async fn background(&mut self) -> Result<()> {
        for result in self.agent.tick().await? {
            info!("🤖 {}", result);
        }

        let actions = {
            let session = self.session.lock();
            let due = session.actions_count > 0 && session.actions_count % IMPROVE_EVERY == 0 && session.last_improvement_at != session.actions_count;
            due.then_some(session.actions_count)
        };
        if let Some(actions) = actions {
            for change in self.improver.run().await? {
                info!("🧠 {}", change);
            }
            self.session.lock().last_improvement_at = actions;
        }
        Ok(())
    }

    async fn execute(&mut self, intent: Intent) -> Result<Flow> {
        let outcome = if intent.is(&IntentKind::AutonomousMode) { self.run_autonomous(&intent).await? } else { self.router.route(&intent).await? };
        self.conclude(intent, outcome).await
    }

    /// Run an autonomous plan step by step, announcing progress.
    async fn run_autonomous(&mut self, intent: &Intent) -> Result<Outcome> {
        let plan = match self.router.review_plan(intent).await? {
            PlanReview::Ready(plan) => plan,
            PlanReview::Halt(outcome) => return Ok(outcome),
        };

        self.voice.speak(&format!("Autonomous mode engaged. Executing {} steps.", plan.len())).await?;
        let mut results = Vec::new();
        for (i, step) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.router.run_steps(std::slice::from_ref(step), intent.confirmed && i == 0).await?;
            if let Outcome::Confirm { question, level, .. } = outcome {
                let remaining = Intent { plan: plan[i..].to_vec(), confirmed: true, ..Intent::of(IntentKind::Pipeline) };
                return Ok(Outcome::Confirm { question, intent: Box::new(remaining), level });
            }
            debug!("Step {} result: {}", i + 1, outcome.message());
            results.push(outcome.message().to_string());
            self.voice.speak(&format!("Step {} complete: {}", i + 1, step.kind_name())).await?;
        }
        results.push("Autonomous task complete.".to_string());
        Ok(Outcome::Done(results.join("\n")))
    }

    async fn conclude(&mut self, intent: Intent, outcome: Outcome) -> Result<Flow> {
        self.sync_voice_mode();
        match &outcome {
            Outcome::Stop => {
                self.voice.speak("Stopping VAL").await?;
                self.dialogue.transition(&mut self.voice, DialogueState::Idle).await?;
                info!("Daemon stopped by voice command");
                return Ok(Flow::Stop);
            }
            Outcome::Ask { .. } | Outcome::Confirm { .. } => {
                self.dialogue.ask(&mut self.voice, &outcome).await?;
                return Ok(Flow::Continue);
            }
            Outcome::Done(_) | Outcome::Failed(_) => {}
        }

        let success = outcome.is_success();
        self.voice.speak(outcome.message()).await?;
        self.memory
            .log_event(Event::new("action_completed").intent(&intent).result(outcome.message()).success(success))
            .await?;
        {
            let mut session = self.session.lock();
            session.actions_count += 1;
            session.last_result = Some(outcome.message().to_string());
            if success
                && recordable(&intent)
                && let Some(recording) = session.recording.as_mut()
            {
                recording.steps.push(intent.kind_name().to_string());
            }
        }

        match self.router.after_intent(&intent, &outcome).await? {
            Some(chained @ (Outcome::Ask { .. } | Outcome::Confirm { .. })) => {
                self.dialogue.ask(&mut self.voice, &chained).await?;
                return Ok(Flow::Continue);
            }
            Some(chained) => self.voice.speak(chained.message()).await?,
            None => {}
        }
        if success {
            self.offer_automation().await?;
        }
        self.dialogue.transition(&mut self.voice, DialogueState::Idle).await?;
        Ok(Flow::Continue)
    }

    /// Passive learning: offer to automate a follow-up the user keeps doing.
    async fn offer_automation(&mut self) -> Result<()> {
        if !self.memory.preference_bool("passive_learning", false).await? {
            return Ok(());
        }
        let Some(pattern) = self.memory.detect_repeated_pattern(PATTERN_MIN_OCCURRENCES).await? else {
            return Ok(());
        };
        let key = format!("{}->{}", pattern.trigger.intent, pattern.actions.join(","));
        if !self.offered.insert(key) {
            return Ok(());
        }
        let known = self.memory.workflows_for_trigger(&pattern.trigger.intent, None, "global").await?;
        if known.iter().any(|w| w.actions == pattern.actions) {
            return Ok(());
        }

        let follow = pattern.actions.first().map(String::as_str).unwrap_or_default().replace('_', " ");
        let trigger = pattern.trigger.intent.replace('_', " ");
        self.voice
            .speak(&format!("I noticed you often {} after {}. Should I automate this? Say 'remember it'.", follow, trigger))
            .await?;
        if let Heard::Text(reply) = self.voice.listen(ListenMode::FollowUp).await?
            && reply.to_lowercase().contains("remember")
        {
            self.memory.remember_workflow(&pattern.trigger, &pattern.actions, "global").await?;
            self.voice.speak("Automated! I'll suggest it next time.").await?;
        }
        Ok(())
    }

    /// Log the error, mention a known fix and return to idle.
    async fn recover(&mut self, error: anyhow::Error) {
        let text = format!("{:#}", error);
        error!("❌ Error in daemon loop: {}", text);
        if let Err(e) = self.memory.log_event(Event::new("system_error").data(json!({"error": text}))).await {
            warn!("Failed to log error: {}", e);
        }

        let message = match self.memory.error_fix(&text).await {
            Ok(Some(fix)) => format!("I encountered an error, but I know a fix: {}.", fix),
            _ => "An error occurred. I'll remember this. Returning to idle.".to_string(),
        };
        if let Err(e) = self.dialogue.reset(&mut self.voice).await {
            warn!("Failed to reset dialogue: {}", e);
        }
        if let Err(e) = self.voice.speak(&message).await {
            warn!("Failed to speak: {}", e);
        }
        tokio::select! {
            _ = tokio::time::sleep(ERROR_BACKOFF) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    #[cfg(test)]
    fn voice(&self) -> &V {
        &self.voice
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::UndoManager;
    use crate::llm::LlmClient;
    use crate::memory::{SafetyAction, WorkflowTrigger};
    use crate::session::{self, ProjectRef, WorkflowRecording};
    use crate::voice::scripted::ScriptedVoice;

    struct Fixture {
        daemon: Daemon<ScriptedVoice>,
        memory: Memory,
        session: SharedSession,
        dir: tempfile::TempDir,
    }

    async fn fixture(inputs: &[Option<&str>]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        let llm = Arc::new(LlmClient::offline());
        let undo = Arc::new(UndoManager::open(&dir.path().join("logs"), memory.clone()).unwrap());
        let router = Router::new(memory.clone(), session.clone(), undo, llm.clone(), dir.path().join("projects"));
        let extractor = IntentExtractor::new(memory.clone(), llm, session.clone());
        let daemon = Daemon::new(ScriptedVoice::new(inputs), memory.clone(), session.clone(), router, extractor, CancellationToken::new());
        Fixture { daemon, memory, session, dir }
    }

    async fn event_types(memory: &Memory) -> Vec<String> {
        memory.recent_events(100).await.unwrap().into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_command_then_stop() {
        let mut f = fixture(&[Some("help"), None, Some("stop now")]).await;
        f.daemon.run().await.unwrap();

        let voice = f.daemon.voice();
        assert!(voice.said("VAL is running"));
        assert!(voice.said("I can create projects"));
        assert!(voice.said("Stopping VAL"));
        assert!(voice.listens.iter().all(|m| *m == ListenMode::Command));
        assert_eq!(f.session.lock().actions_count, 1);

        let events = event_types(&f.memory).await;
        for expected in ["system_start", "voice_command", "state_change", "action_completed", "system_stop"] {
            assert!(events.iter().any(|e| e == expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_confirmation_uses_follow_up() {
        let mut f = fixture(&[Some("delete file notes.txt"), Some("confirm")]).await;
        let project = f.dir.path().join("shop");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("notes.txt"), "todo").unwrap();
        f.session.lock().last_project = Some(ProjectRef { name: "shop".into(), path: project.to_string_lossy().to_string() });

        f.daemon.run().await.unwrap();

        let voice = f.daemon.voice();
        assert!(voice.said("Say confirm to proceed"));
        assert_eq!(voice.listens[..2], [ListenMode::Command, ListenMode::FollowUp]);
        assert!(!project.join("notes.txt").exists());
        assert_eq!(f.session.lock().state, DialogueState::Idle);
    }

    #[tokio::test]
    async fn test_learned_workflow_confirmation_is_held() {
        let mut f = fixture(&[Some("help"), Some("confirm")]).await;
        f.memory.add_safety_rule("dangerous_action", "delete", SafetyAction::Confirm, "Removes files").await.unwrap();
        let trigger = WorkflowTrigger { intent: "help".into(), tech: None };
        f.memory.remember_workflow(&trigger, &["delete_file".to_string()], "global").await.unwrap();

        f.daemon.run().await.unwrap();

        let voice = f.daemon.voice();
        assert!(voice.said("Step 1 (delete_file) needs confirmation"));
        assert!(!voice.said("Nothing is waiting for confirmation"));
        assert_eq!(voice.listens[..2], [ListenMode::Command, ListenMode::FollowUp]);
        assert!(event_types(&f.memory).await.contains(&"pipeline_executed".to_string()));
        assert!(f.session.lock().pending.is_none());
        assert_eq!(f.session.lock().state, DialogueState::Idle);
    }

    #[tokio::test]
    async fn test_silence_cancels_confirmation() {
        let mut f = fixture(&[Some("delete file notes.txt"), None]).await;
        let project = f.dir.path().join("shop");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("notes.txt"), "todo").unwrap();
        f.session.lock().last_project = Some(ProjectRef { name: "shop".into(), path: project.to_string_lossy().to_string() });

        f.daemon.run().await.unwrap();

        assert!(f.daemon.voice().said("Action cancelled due to silence"));
        assert!(project.join("notes.txt").exists());
        assert!(f.session.lock().pending.is_none());
    }

    #[tokio::test]
    async fn test_autonomous_plan_reports_progress() {
        let mut f = fixture(&[]).await;
        let intent = Intent { plan: vec![Intent::of(IntentKind::Help), Intent::of(IntentKind::ListGoals)], ..Intent::of(IntentKind::AutonomousMode) };

        assert_eq!(f.daemon.execute(intent).await.unwrap(), Flow::Continue);

        let voice = f.daemon.voice();
        assert!(voice.said("Executing 2 steps"));
        assert!(voice.said("Step 1 complete: help"));
        assert!(voice.said("Step 2 complete: list_goals"));
        assert!(voice.said("Autonomous task complete."));
    }

    #[tokio::test]
    async fn test_successful_actions_are_recorded() {
        let mut f = fixture(&[]).await;
        f.session.lock().recording = Some(WorkflowRecording { name: "morning".into(), steps: Vec::new() });

        f.daemon.execute(Intent::of(IntentKind::Help).with_confidence(1.0)).await.unwrap();
        f.daemon.execute(Intent::of(IntentKind::ListGoals).with_confidence(1.0)).await.unwrap();

        let steps = f.session.lock().recording.as_ref().unwrap().steps.clone();
        assert_eq!(steps, vec!["help", "list_goals"]);
    }

    #[tokio::test]
    async fn test_passive_learning_offer() {
        let mut f = fixture(&[Some("remember it")]).await;
        f.memory.set_preference("passive_learning", &json!(true), "learning").await.unwrap();
        for _ in 0..3 {
            for kind in [IntentKind::Help, IntentKind::ListProjects] {
                f.memory.log_event(Event::new("action_completed").intent(&Intent::of(kind)).success(true)).await.unwrap();
            }
        }

        f.daemon.offer_automation().await.unwrap();
        assert!(f.daemon.voice().said("I noticed you often list projects after help"));
        assert!(f.daemon.voice().said("Automated!"));

        let learned = f.memory.workflows_for_trigger("help", None, "global").await.unwrap();
        assert_eq!(learned[0].actions, vec!["list_projects"]);

        // Offered once per run
        f.daemon.offer_automation().await.unwrap();
        assert_eq!(f.daemon.voice().spoken.len(), 2);
    }

    #[tokio::test]
    async fn test_error_speaks_known_fix() {
        let mut f = fixture(&[]).await;
        f.memory.remember_error_fix("database is locked", "restart the daemon").await.unwrap();
        f.session.lock().set_state(DialogueState::Executing);

        f.daemon.recover(anyhow::anyhow!("database is locked")).await;

        assert!(f.daemon.voice().said("I know a fix: restart the daemon"));
        assert_eq!(f.session.lock().state, DialogueState::Idle);
        assert!(event_types(&f.memory).await.contains(&"system_error".to_string()));
    }
}
