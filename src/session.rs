//! Short-term, in-process session context.
//!
//! Shared between the daemon loop, the router and the status endpoint as an
//! `Arc<Mutex<Session>>`. Nothing here survives a restart; long-term state
//! belongs in [`crate::memory::Memory`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::intent::Intent;
use crate::memory::SafetyVerdict;

/// Maximum number of conversation messages kept in context.
const MAX_CONTEXT_MESSAGES: usize = 10;

/// Default minimum confidence before an intent runs without confirmation.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Dialogue state of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Confirming,
    Clarifying,
    Executing,
}

impl std::fmt::Display for DialogueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DialogueState::Idle => "idle",
            DialogueState::Listening => "listening",
            DialogueState::Thinking => "thinking",
            DialogueState::Confirming => "confirming",
            DialogueState::Clarifying => "clarifying",
            DialogueState::Executing => "executing",
        };
        f.write_str(name)
    }
}

/// Argument the user still has to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Name,
    Path,
}

/// Action waiting for a confirmation, a clarification or a missing argument.
#[derive(Debug, Clone, Serialize)]
pub struct PendingAction {
    pub intent: Intent,
    pub verdict: Option<SafetyVerdict>,
    pub reason: String,
    pub missing: Option<Slot>,
    pub options: Vec<String>,
}

impl PendingAction {
    pub fn new(intent: Intent, reason: impl Into<String>) -> Self {
        Self { intent, verdict: None, reason: reason.into(), missing: None, options: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

/// How replies are spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    #[default]
    Normal,
    Whisper,
}

/// Voice preferences cached from memory.
#[derive(Debug, Clone, Serialize)]
pub struct VoicePrefs {
    pub wake_word_enabled: bool,
    pub push_to_talk: bool,
    pub confidence_threshold: f64,
}

impl Default for VoicePrefs {
    fn default() -> Self {
        Self { wake_word_enabled: true, push_to_talk: false, confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD }
    }
}

/// Project the session is working on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRef {
    pub name: String,
    pub path: String,
}

/// Workflow being recorded step by step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRecording {
    pub name: String,
    pub steps: Vec<String>,
}

/// Session record.
#[derive(Debug, Default, Serialize)]
pub struct Session {
    pub state: DialogueState,
    pub last_command: Option<String>,
    pub last_project: Option<ProjectRef>,
    pub last_intent: Option<Intent>,
    pub pending: Option<PendingAction>,
    pub last_result: Option<String>,
    conversation: VecDeque<ContextMessage>,
    pub current_task: Option<String>,
    pub actions_count: u64,
    pub last_improvement_at: u64,
    pub preferences: BTreeMap<String, Value>,
    pub voice: VoicePrefs,
    pub project_changed: bool,
    pub env: BTreeMap<String, String>,
    pub recording: Option<WorkflowRecording>,
    pub voice_mode: VoiceMode,
    pub agent_ticks: u64,
}

/// Session shared across tasks.
pub type SharedSession = Arc<Mutex<Session>>;

/// Create an empty shared session.
pub fn shared() -> SharedSession {
    Arc::new(Mutex::new(Session::default()))
}

impl Session {
    /// Append a message, keeping only the most recent ones.
    pub fn add_to_context(&mut self, role: &str, content: &str) {
        self.conversation.push_back(ContextMessage { role: role.to_string(), content: content.to_string() });
        while self.conversation.len() > MAX_CONTEXT_MESSAGES {
            self.conversation.pop_front();
        }
    }

    pub fn context(&self) -> Vec<ContextMessage> {
        self.conversation.iter().cloned().collect()
    }

    /// Drop conversation and pending action, keep preferences.
    pub fn reset_conversation(&mut self) {
        self.conversation.clear();
        self.pending = None;
        self.current_task = None;
        self.state = DialogueState::Idle;
    }

    /// Change state, returning the previous one.
    pub fn set_state(&mut self, state: DialogueState) -> DialogueState {
        std::mem::replace(&mut self.state, state)
    }

    /// Cache preferences and derive the voice settings from them.
    pub fn apply_preferences(&mut self, preferences: BTreeMap<String, Value>) {
        if let Some(enabled) = preferences.get("wake_word_enabled").and_then(Value::as_bool) {
            self.voice.wake_word_enabled = enabled;
        }
        if let Some(ptt) = preferences.get("push_to_talk").and_then(Value::as_bool) {
            self.voice.push_to_talk = ptt;
        }
        if let Some(threshold) = preferences.get("confidence_threshold").and_then(Value::as_f64) {
            self.voice.confidence_threshold = threshold;
        }
        self.preferences = preferences;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_context_is_bounded() {
        let mut session = Session::default();
        for i in 0..15 {
            session.add_to_context("user", &format!("message {}", i));
        }
        let context = session.context();
        assert_eq!(context.len(), 10);
        assert_eq!(context[0].content, "message 5");
    }

    #[test]
    fn test_reset_keeps_preferences() {
        let mut session = Session::default();
        session.apply_preferences(BTreeMap::from([("confidence_threshold".to_string(), json!(0.9))]));
        session.add_to_context("user", "hello");
        session.pending = Some(PendingAction::new(Intent::default(), "test"));
        session.set_state(DialogueState::Confirming);

        session.reset_conversation();
        assert_eq!(session.state, DialogueState::Idle);
        assert!(session.pending.is_none());
        assert!(session.context().is_empty());
        assert_eq!(session.voice.confidence_threshold, 0.9);
    }

    #[test]
    fn test_set_state_returns_previous() {
        let mut session = Session::default();
        assert_eq!(session.set_state(DialogueState::Listening), DialogueState::Idle);
        assert_eq!(session.state, DialogueState::Listening);
    }
}
