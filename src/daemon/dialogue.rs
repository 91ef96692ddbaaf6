//! Dialogue state machine.
//!
//! Decides what happens to each extracted intent given the current
//! [`DialogueState`]: run it, ask for a confirmation, ask which option was
//! meant or fill a missing argument from the reply. Every transition is
//! logged as a `state_change` event.

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use crate::engine::Outcome;
use crate::intent::{Intent, IntentKind, is_cancel, is_confirm};
use crate::memory::{Event, Memory, RiskLevel, SafetyAction, SafetyVerdict};
use crate::session::{DialogueState, PendingAction, SharedSession, Slot};
use crate::voice::{Earcon, Voice};

/// Below this confidence the user picks from options instead of confirming.
const CLARIFY_BELOW: f64 = 0.7;
/// Confidence given to an intent once the user picked an option.
const RESOLVED_CONFIDENCE: f64 = 0.95;
const CANCEL_FEEDBACK: f64 = -0.5;

/// Options offered for an ambiguous request.
fn options_for(intent: &Intent) -> Vec<String> {
    let raw = intent.raw.as_deref().unwrap_or_default().to_lowercase();
    let options: &[&str] = if raw.contains("backend") {
        &["Flask", "Django", "Node"]
    } else if raw.contains("frontend") {
        &["React", "Vue", "Svelte"]
    } else {
        &["Yes", "No"]
    };
    options.iter().map(|o| o.to_string()).collect()
}

fn confirmation_question(verdict: &SafetyVerdict) -> String {
    if verdict.level == RiskLevel::Critical {
        format!("Critical warning: {}. This is irreversible. Say 'confirm critical' to proceed.", verdict.reason)
    } else {
        format!("Warning: {}. Say confirm to proceed.", verdict.reason)
    }
}

fn fill_slot(intent: &mut Intent, slot: Slot, value: &str) {
    let value = value.trim().trim_end_matches(['.', '!', '?']).to_string();
    match slot {
        Slot::Name => intent.name = Some(value),
        Slot::Path => intent.path = Some(value),
    }
}

fn said_cancel(intent: &Intent, raw: &str) -> bool {
    intent.response.as_deref() == Some("cancel") || is_cancel(raw)
}

pub struct Dialogue {
    memory: Memory,
    session: SharedSession,
}

impl Dialogue {
    pub fn new(memory: Memory, session: SharedSession) -> Self {
        Self { memory, session }
    }

    pub fn state(&self) -> DialogueState {
        self.session.lock().state
    }

    /// Whether the next utterance answers a question rather than being a
    /// new command.
    pub fn awaiting_reply(&self) -> bool {
        matches!(self.state(), DialogueState::Confirming | DialogueState::Clarifying)
    }

    /// Move to `to`. Entering `Listening` plays an earcon.
    pub async fn transition<V: Voice>(&self, voice: &mut V, to: DialogueState) -> Result<()> {
        let from = self.session.lock().set_state(to);
        if from == to {
            return Ok(());
        }
        debug!("State transition: {} -> {}", from, to);
        if to == DialogueState::Listening {
            voice.earcon(Earcon::Listening).await;
        }
        self.memory
            .log_event(Event::new("state_change").data(json!({"from": from.to_string(), "to": to.to_string()})))
            .await?;
        Ok(())
    }

    /// Feed one extracted intent through the state machine.
    ///
    /// Returns the intent to execute, in which case the state is
    /// `Executing`; otherwise the user has been told what happens next.
    pub async fn handle<V: Voice>(&self, voice: &mut V, intent: Intent) -> Result<Option<Intent>> {
        match self.state() {
            DialogueState::Idle | DialogueState::Listening => self.on_command(voice, intent).await,
            DialogueState::Confirming => self.on_confirmation(voice, intent).await,
            DialogueState::Clarifying => self.on_clarification(voice, intent).await,
            DialogueState::Thinking | DialogueState::Executing => {
                self.settle(voice, "I was busy executing. Please repeat your command.").await?;
                Ok(None)
            }
        }
    }

    async fn on_command<V: Voice>(&self, voice: &mut V, intent: Intent) -> Result<Option<Intent>> {
        self.transition(voice, DialogueState::Listening).await?;
        if intent.is_empty() {
            self.settle(voice, "I didn't catch that").await?;
            return Ok(None);
        }
        self.transition(voice, DialogueState::Thinking).await?;

        let action = intent.action.clone().unwrap_or_else(|| intent.kind_name().to_string());
        let verdict = self.memory.check_safety(&intent, &action, intent.path.as_deref()).await?;
        match verdict.action {
            SafetyAction::Deny => {
                self.settle(voice, &format!("Cannot proceed: {}", verdict.reason)).await?;
                return Ok(None);
            }
            SafetyAction::Confirm if !intent.confirmed => {
                let question = confirmation_question(&verdict);
                let reason = verdict.reason.clone();
                let pending = PendingAction { verdict: Some(verdict), ..PendingAction::new(Intent { confirmed: true, ..intent }, reason) };
                self.hold(voice, pending, DialogueState::Confirming, &question).await?;
                return Ok(None);
            }
            _ => {}
        }

        let confidence = intent.confidence();
        if intent.ambiguous || confidence < CLARIFY_BELOW {
            let options = options_for(&intent);
            let question = format!("Got it, but clarify: {}?", options.join(" or "));
            let pending = PendingAction { options, ..PendingAction::new(intent, "ambiguous request") };
            self.hold(voice, pending, DialogueState::Clarifying, &question).await?;
            return Ok(None);
        }

        let threshold = self.session.lock().voice.confidence_threshold;
        if confidence < threshold {
            let heard = intent.raw.clone().or_else(|| intent.name.clone()).unwrap_or_default();
            let question = format!("I'm not sure I understood. You said: '{}'. Say 'confirm' to proceed or 'cancel'.", heard);
            let pending = PendingAction::new(intent, format!("Low confidence ({:.2})", confidence));
            self.hold(voice, pending, DialogueState::Confirming, &question).await?;
            return Ok(None);
        }

        self.transition(voice, DialogueState::Executing).await?;
        Ok(Some(intent))
    }

    async fn on_confirmation<V: Voice>(&self, voice: &mut V, reply: Intent) -> Result<Option<Intent>> {
        let pending = self.session.lock().pending.take();
        let Some(pending) = pending else {
            self.settle(voice, "No pending action to confirm").await?;
            return Ok(None);
        };
        let raw = reply.raw.clone().unwrap_or_default();

        if let Some(slot) = pending.missing {
            if !raw.trim().is_empty() && !said_cancel(&reply, &raw) {
                let mut intent = pending.intent;
                fill_slot(&mut intent, slot, &raw);
                self.transition(voice, DialogueState::Executing).await?;
                return Ok(Some(intent));
            }
        } else {
            let critical = pending.verdict.as_ref().is_some_and(|v| v.level == RiskLevel::Critical);
            let confirmed = reply.response.as_deref() == Some("confirm") || is_confirm(&raw);
            if confirmed && (!critical || raw.to_lowercase().contains("critical")) {
                self.transition(voice, DialogueState::Executing).await?;
                return Ok(Some(pending.intent));
            }
        }

        self.memory.log_feedback(pending.intent.kind_name(), "cancel", CANCEL_FEEDBACK).await?;
        self.settle(voice, "Action cancelled").await?;
        Ok(None)
    }

    async fn on_clarification<V: Voice>(&self, voice: &mut V, reply: Intent) -> Result<Option<Intent>> {
        let raw = reply.raw.clone().unwrap_or_default();
        let choice = raw.trim().trim_end_matches(['.', '!', '?']).to_lowercase();
        let options = self.session.lock().pending.as_ref().map(|p| p.options.clone()).unwrap_or_default();

        if said_cancel(&reply, &raw) || options.is_empty() {
            self.session.lock().pending = None;
            self.settle(voice, "Action cancelled").await?;
            return Ok(None);
        }

        let Some(picked) = options.into_iter().find(|o| {
            let option = o.to_lowercase();
            choice == option || choice.split_whitespace().any(|w| w == option)
        }) else {
            voice.speak("Try an option.").await?;
            return Ok(None);
        };

        let pending = self.session.lock().pending.take();
        let Some(pending) = pending else {
            return Ok(None);
        };
        let mut intent = pending.intent;
        if let Some(kind) = IntentKind::for_tech(&picked) {
            intent.intent = Some(kind);
        }
        intent.ambiguous = false;
        intent.confidence = Some(RESOLVED_CONFIDENCE);

        voice.speak(&format!("Got {}. Proceeding.", picked)).await?;
        self.transition(voice, DialogueState::Executing).await?;
        Ok(Some(intent))
    }

    /// Park a router question until the user answers it.
    pub async fn ask<V: Voice>(&self, voice: &mut V, outcome: &Outcome) -> Result<()> {
        match outcome {
            Outcome::Ask { question, slot, intent } => {
                let pending = PendingAction { missing: Some(*slot), ..PendingAction::new((**intent).clone(), question.clone()) };
                self.hold(voice, pending, DialogueState::Confirming, question).await
            }
            Outcome::Confirm { question, intent, level } => {
                let verdict = SafetyVerdict { safe: false, action: SafetyAction::Confirm, level: *level, reason: question.clone() };
                let question = if *level == RiskLevel::Critical {
                    format!("{} This is irreversible. Say 'confirm critical' to proceed.", question)
                } else {
                    question.clone()
                };
                let pending = PendingAction { verdict: Some(verdict), ..PendingAction::new((**intent).clone(), question.clone()) };
                self.hold(voice, pending, DialogueState::Confirming, &question).await
            }
            other => voice.speak(other.message()).await,
        }
    }

    /// The user said nothing while a question was open.
    pub async fn cancel_on_silence<V: Voice>(&self, voice: &mut V) -> Result<()> {
        self.session.lock().pending = None;
        self.settle(voice, "Action cancelled due to silence").await
    }

    /// Back to idle, dropping any open question.
    pub async fn reset<V: Voice>(&self, voice: &mut V) -> Result<()> {
        self.session.lock().pending = None;
        self.transition(voice, DialogueState::Idle).await?;
        self.session.lock().reset_conversation();
        Ok(())
    }

    async fn hold<V: Voice>(&self, voice: &mut V, pending: PendingAction, state: DialogueState, question: &str) -> Result<()> {
        self.session.lock().pending = Some(pending);
        self.transition(voice, state).await?;
        voice.speak(question).await
    }

    async fn settle<V: Voice>(&self, voice: &mut V, message: &str) -> Result<()> {
        self.transition(voice, DialogueState::Idle).await?;
        voice.speak(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session;
    use crate::voice::scripted::ScriptedVoice;

    async fn dialogue() -> (Dialogue, Memory, SharedSession) {
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        (Dialogue::new(memory.clone(), session.clone()), memory, session)
    }

    fn said(text: &str) -> Intent {
        Intent { raw: Some(text.to_string()), ..Default::default() }.with_confidence(0.5)
    }

    fn reply(text: &str, response: &str) -> Intent {
        Intent { raw: Some(text.to_string()), response: Some(response.to_string()), ..Default::default() }.with_confidence(0.9)
    }

    #[tokio::test]
    async fn test_confident_command_executes() {
        let (dialogue, memory, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent::of(IntentKind::Help).with_confidence(0.9);

        let run = dialogue.handle(&mut voice, intent.clone()).await.unwrap();
        assert_eq!(run, Some(intent));
        assert_eq!(dialogue.state(), DialogueState::Executing);
        assert_eq!(voice.earcons, vec![Earcon::Listening]);

        let changes: Vec<_> = memory.recent_events(10).await.unwrap().into_iter().filter(|e| e.event_type == "state_change").collect();
        assert_eq!(changes.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_command() {
        let (dialogue, _, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        assert!(dialogue.handle(&mut voice, Intent::default()).await.unwrap().is_none());
        assert!(voice.said("I didn't catch that"));
        assert_eq!(dialogue.state(), DialogueState::Idle);
    }

    #[tokio::test]
    async fn test_protected_path_is_refused() {
        let (dialogue, _, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent { path: Some("/etc/passwd".to_string()), ..Intent::of(IntentKind::CreateFile) }.with_confidence(0.9);
        assert!(dialogue.handle(&mut voice, intent).await.unwrap().is_none());
        assert!(voice.said("Cannot proceed"));
        assert_eq!(dialogue.state(), DialogueState::Idle);
    }

    #[tokio::test]
    async fn test_dangerous_action_confirmed() {
        let (dialogue, _, session) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent { path: Some("old.txt".to_string()), ..Intent::of(IntentKind::DeleteFile) }.with_confidence(0.9);

        assert!(dialogue.handle(&mut voice, intent).await.unwrap().is_none());
        assert_eq!(dialogue.state(), DialogueState::Confirming);
        assert!(voice.said("Say confirm to proceed"));
        assert!(dialogue.awaiting_reply());

        let run = dialogue.handle(&mut voice, reply("confirm", "confirm")).await.unwrap().unwrap();
        assert!(run.is(&IntentKind::DeleteFile));
        assert!(run.confirmed);
        assert!(session.lock().pending.is_none());
    }

    #[tokio::test]
    async fn test_critical_action_needs_the_word() {
        let (dialogue, memory, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent { force: true, ..Intent::of(IntentKind::GitPush) }.with_confidence(0.9);

        dialogue.handle(&mut voice, intent.clone()).await.unwrap();
        assert!(voice.said("confirm critical"));
        assert!(dialogue.handle(&mut voice, reply("confirm", "confirm")).await.unwrap().is_none());
        assert!(voice.said("Action cancelled"));

        let feedback: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE signal = 'cancel'").fetch_one(memory.pool()).await.unwrap();
        assert_eq!(feedback, 1);

        dialogue.handle(&mut voice, intent).await.unwrap();
        let run = dialogue.handle(&mut voice, reply("confirm critical", "confirm")).await.unwrap();
        assert!(run.is_some_and(|i| i.is(&IntentKind::GitPush)));
    }

    #[tokio::test]
    async fn test_ambiguous_backend_is_clarified() {
        let (dialogue, _, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent { raw: Some("create a backend called api".to_string()), ambiguous: true, ..Intent::of(IntentKind::CreateProject) }
            .with_name("api")
            .with_confidence(0.6);

        assert!(dialogue.handle(&mut voice, intent).await.unwrap().is_none());
        assert_eq!(dialogue.state(), DialogueState::Clarifying);
        assert!(voice.said("Flask or Django or Node"));

        assert!(dialogue.handle(&mut voice, said("rust")).await.unwrap().is_none());
        assert!(voice.said("Try an option."));
        assert_eq!(dialogue.state(), DialogueState::Clarifying);

        let run = dialogue.handle(&mut voice, said("Django.")).await.unwrap().unwrap();
        assert!(run.is(&IntentKind::CreateDjangoProject));
        assert_eq!(run.name.as_deref(), Some("api"));
        assert!(!run.ambiguous);
        assert_eq!(run.confidence, Some(RESOLVED_CONFIDENCE));
    }

    #[tokio::test]
    async fn test_clarification_cancelled() {
        let (dialogue, _, session) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        dialogue.handle(&mut voice, said("what about that thing")).await.unwrap();
        assert!(voice.said("Yes or No"));

        assert!(dialogue.handle(&mut voice, reply("cancel", "cancel")).await.unwrap().is_none());
        assert_eq!(dialogue.state(), DialogueState::Idle);
        assert!(session.lock().pending.is_none());
    }

    #[tokio::test]
    async fn test_low_confidence_asks_to_confirm() {
        let (dialogue, _, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let intent = Intent { raw: Some("run it".to_string()), ..Intent::of(IntentKind::RunProject) }.with_confidence(0.72);

        assert!(dialogue.handle(&mut voice, intent).await.unwrap().is_none());
        assert!(voice.said("You said: 'run it'"));
        let run = dialogue.handle(&mut voice, reply("yes", "confirm")).await.unwrap();
        assert!(run.is_some_and(|i| i.is(&IntentKind::RunProject)));
    }

    #[tokio::test]
    async fn test_missing_slot_filled_from_reply() {
        let (dialogue, _, _) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        let outcome = Outcome::Ask {
            question: "What should I call it?".to_string(),
            slot: Slot::Name,
            intent: Box::new(Intent::of(IntentKind::CreateFlaskProject)),
        };
        dialogue.ask(&mut voice, &outcome).await.unwrap();
        assert_eq!(dialogue.state(), DialogueState::Confirming);
        assert!(voice.said("What should I call it?"));

        let run = dialogue.handle(&mut voice, said("shop.")).await.unwrap().unwrap();
        assert!(run.is(&IntentKind::CreateFlaskProject));
        assert_eq!(run.name.as_deref(), Some("shop"));
    }

    #[tokio::test]
    async fn test_silence_cancels_question() {
        let (dialogue, _, session) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        dialogue.handle(&mut voice, said("something vague")).await.unwrap();
        dialogue.cancel_on_silence(&mut voice).await.unwrap();
        assert!(voice.said("due to silence"));
        assert_eq!(dialogue.state(), DialogueState::Idle);
        assert!(session.lock().pending.is_none());
    }

    #[tokio::test]
    async fn test_busy_while_executing() {
        let (dialogue, _, session) = dialogue().await;
        let mut voice = ScriptedVoice::new(&[]);
        session.lock().set_state(DialogueState::Executing);
        assert!(dialogue.handle(&mut voice, Intent::of(IntentKind::Help).with_confidence(1.0)).await.unwrap().is_none());
        assert!(voice.said("I was busy"));
        assert_eq!(dialogue.state(), DialogueState::Idle);
    }
}
