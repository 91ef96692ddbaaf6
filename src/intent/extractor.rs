use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Intent, IntentKind, prompt};
use crate::error::{Result, ValError};
use crate::llm::{LlmClient, json_slice};
use crate::memory::{Event, Memory, WorkflowTrigger};
use crate::session::SharedSession;

const CONFIRM_WORDS: [&str; 6] = ["confirm", "yes", "proceed", "go ahead", "sure", "do it"];
const CANCEL_WORDS: [&str; 5] = ["cancel", "no", "stop", "abort", "never mind"];
const APPS: [&str; 6] = ["code", "browser", "postman", "terminal", "docker", "editor"];
const WORKFLOW_PHRASES: [&str; 4] = ["remember:", "always do", "from now on", "automate"];

/// Technology keywords, checked in order.
const TECH_WORDS: [&str; 10] = ["react", "django", "flask", "flutter", "node", "vue", "svelte", "website", "web", "data"];

static REMEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:remember|store)\s+(?:that\s+|this\s+)?(.+?)\s+is\s+(.+)$").unwrap());
static EXPLAIN_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"explain(?: this)? file (.+)").unwrap());
static FIND_CALLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"calls? (?:the )?(\w+) function").unwrap());
static UNDO_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"undo (?:the )?last (\d+)").unwrap());
static COMPLETE_GOAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:complete|finish|finished|done with) goal (\d+)").unwrap());
static FILE_TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^when (?:files?|the project|code) changes?,?\s+(?:run\s+|do\s+)?(.+)$").unwrap());
static CHAIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" and then | then |,").unwrap());
static WORKFLOW_TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:after|when)\s+(?:creating|making|create|make)\s+(?:a\s+|an\s+)?([a-z]+)(?:\s+(?:project|app))?").unwrap());
static STEP_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",| and | then ").unwrap());
static CREATE_FOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"create.*folder\s+(.+)").unwrap());
static CREATE_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"create.*file\s+(.+)").unwrap());

/// Whether a reply confirms the pending action.
pub fn is_confirm(text: &str) -> bool {
    let text = normalize(text);
    CONFIRM_WORDS.contains(&text.as_str()) || text.starts_with("confirm")
}

/// Whether a reply cancels the pending action.
pub fn is_cancel(text: &str) -> bool {
    CANCEL_WORDS.contains(&normalize(text).as_str())
}

fn normalize(text: &str) -> String {
    text.trim().trim_end_matches(['.', '!', '?']).trim().to_lowercase()
}

fn mentioned_tech(text: &str) -> Option<&'static str> {
    TECH_WORDS.iter().copied().find(|t| text.contains(t))
}

/// Map a spoken step such as "install deps" to an intent name.
pub fn step_name(step: &str) -> String {
    let step = step.trim().to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| step.contains(w));

    if let Some(kind) = mentioned_tech(&step).and_then(IntentKind::for_tech)
        && (has(&["create", "new", "make", "set up", "setup"]) || step.split_whitespace().count() <= 2)
    {
        return kind.as_str().to_string();
    }
    if has(&["install", "deps", "dependencies"]) {
        "install_dependencies".to_string()
    } else if has(&["docker"]) {
        "add_docker".to_string()
    } else if has(&["git init", "initialize git", "init git"]) {
        "git_init".to_string()
    } else if has(&["commit"]) {
        "git_commit".to_string()
    } else if has(&["push"]) {
        "git_push".to_string()
    } else if has(&["code", "editor", "vscode"]) {
        "open_vscode".to_string()
    } else if has(&["browser"]) {
        "open_browser".to_string()
    } else if has(&["run", "start", "serve"]) {
        "run_project".to_string()
    } else if has(&["env"]) {
        "env_create".to_string()
    } else {
        step.split_whitespace().collect::<Vec<_>>().join("_")
    }
}

fn with_params(kind: IntentKind, params: Value, confidence: f64) -> Intent {
    Intent { parameters: Some(params), ..Intent::of(kind) }.with_confidence(confidence)
}

/// Rules tried before the language model.
fn fast_path(lowered: &str) -> Option<Intent> {
    let has = |phrase: &str| lowered.contains(phrase);

    if let Some(caps) = REMEMBER.captures(lowered) {
        let intent = with_params(IntentKind::Remember, json!({"key": caps[1].trim(), "value": caps[2].trim()}), 0.9);
        return Some(Intent { action: Some("store_memory".to_string()), ..intent });
    }
    for prefix in ["recall", "what did i say about", "tell me about"] {
        if let Some(key) = lowered.strip_prefix(prefix) {
            return Some(with_params(IntentKind::Recall, json!({"key": key.trim()}), 0.8));
        }
    }
    for prefix in ["forget about", "delete memory of"] {
        if let Some(key) = lowered.strip_prefix(prefix) {
            return Some(with_params(IntentKind::Forget, json!({"key": key.trim()}), 0.8));
        }
    }
    if is_confirm(lowered) {
        return Some(Intent { response: Some("confirm".to_string()), ..Default::default() }.with_confidence(0.9));
    }
    if is_cancel(lowered) {
        return Some(Intent { response: Some("cancel".to_string()), ..Default::default() }.with_confidence(0.9));
    }
    if let Some(caps) = FILE_TRIGGER.captures(lowered) {
        let params = json!({"type": "event", "condition": "file_changed", "action": caps[1].trim()});
        return Some(with_params(IntentKind::AddTrigger, params, 0.85));
    }

    let simple = |kind: IntentKind, confidence: f64| Some(Intent::of(kind).with_confidence(confidence));
    if matches!(lowered, "list projects" | "show projects" | "what projects have i made") {
        return simple(IntentKind::ListProjects, 0.9);
    }
    if matches!(lowered, "open last project" | "go to last project" | "where was my last project") {
        return simple(IntentKind::OpenLastProject, 0.9);
    }
    if has("like before") || has("similar to last") {
        return simple(IntentKind::SimilarToLast, 0.8);
    }
    if let Some(caps) = EXPLAIN_FILE.captures(lowered) {
        return Some(Intent { file: Some(caps[1].trim().to_string()), ..Intent::of(IntentKind::ExplainFile) }.with_confidence(0.9));
    }
    if has("where is auth") || has("find auth") || has("authentication handled") {
        return simple(IntentKind::FindAuth, 0.8);
    }
    if has("show api routes") || has("show routes") || has("api endpoints") {
        return simple(IntentKind::ShowRoutes, 0.8);
    }
    if has("which file")
        && let Some(caps) = FIND_CALLS.captures(lowered)
    {
        return Some(Intent { function: Some(caps[1].to_string()), ..Intent::of(IntentKind::FindCalls) }.with_confidence(0.8));
    }
    if has("check health") || has("project health") {
        return simple(IntentKind::CheckHealth, 0.9);
    }
    if has("what's missing") || has("what is missing") || has("quick health") {
        return simple(IntentKind::QuickHealth, 0.8);
    }
    if has("undo history") || has("list undo") {
        return simple(IntentKind::ListUndo, 0.8);
    }
    if has("undo") && (has("last") || has("multiple") || has("operations")) {
        if let Some(count) = UNDO_COUNT.captures(lowered).and_then(|c| c[1].parse::<u32>().ok()) {
            return Some(Intent { count: Some(count), ..Intent::of(IntentKind::UndoMultiple) }.with_confidence(0.9));
        }
        return simple(IntentKind::Undo, 0.9);
    }
    if let Some(app) = lowered.strip_prefix("open ")
        && APPS.iter().any(|a| app.contains(a))
    {
        return Some(Intent::of(IntentKind::OpenApp).with_name(app.trim()).with_confidence(0.9));
    }
    if has("whisper mode") {
        return Some(Intent { mode: Some("whisper".to_string()), ..Intent::of(IntentKind::SetVoiceMode) }.with_confidence(0.9));
    }
    if has("normal mode") {
        return Some(Intent { mode: Some("normal".to_string()), ..Intent::of(IntentKind::SetVoiceMode) }.with_confidence(0.9));
    }
    for prefix in ["set a goal to", "set goal to", "set goal"] {
        if let Some(description) = lowered.strip_prefix(prefix) {
            let description = description.trim_start_matches(':').trim();
            return Some(Intent { description: Some(description.to_string()), ..Intent::of(IntentKind::SetGoal) }.with_confidence(0.9));
        }
    }
    if has("my goals") || has("list goals") {
        return simple(IntentKind::ListGoals, 0.9);
    }
    if let Some(id) = COMPLETE_GOAL.captures(lowered).and_then(|c| c[1].parse::<i64>().ok()) {
        return Some(with_params(IntentKind::CompleteGoal, json!({"goal_id": id}), 0.9));
    }

    if !WORKFLOW_PHRASES.iter().any(|p| has(p)) {
        let steps: Vec<String> = CHAIN.split(lowered).map(str::trim).filter(|s| !s.is_empty()).map(step_name).collect();
        if steps.len() > 1 {
            return Some(Intent { steps, ..Intent::of(IntentKind::Pipeline) }.with_confidence(0.8));
        }
    }
    if has("create backend") || has("create project") || has("create a project") {
        return Some(Intent { ambiguous: true, ..Intent::of(IntentKind::CreateProject) }.with_confidence(0.6));
    }
    if has("undo") {
        return simple(IntentKind::Undo, 0.9);
    }
    if has("stop") {
        return simple(IntentKind::Stop, 0.9);
    }
    None
}

/// Rules used when the language model cannot answer.
fn fallback(lowered: &str) -> Intent {
    let has = |phrase: &str| lowered.contains(phrase);

    if WORKFLOW_PHRASES.iter().any(|p| has(p))
        && let Some(caps) = WORKFLOW_TRIGGER.captures(lowered)
    {
        let tech = caps[1].to_string();
        let rest = &lowered[caps.get(0).map_or(0, |m| m.end())..];
        let actions: Vec<String> = STEP_SPLIT.split(rest).map(str::trim).filter(|s| !s.is_empty()).map(step_name).collect();
        if !actions.is_empty() {
            let intent_name =
                IntentKind::for_tech(&tech).map(|k| k.as_str().to_string()).unwrap_or_else(|| format!("create_{}_project", tech));
            return Intent {
                trigger: Some(WorkflowTrigger { intent: intent_name, tech: Some(tech) }),
                actions,
                ..Intent::of(IntentKind::RememberWorkflow)
            }
            .with_confidence(0.85);
        }
    }

    if let Some(tech) = mentioned_tech(lowered) {
        if has("full setup") {
            return Intent::of(IntentKind::ExecutePipeline).with_name(format!("{}_full_setup", tech)).with_confidence(0.8);
        }
        if let Some(kind) = IntentKind::for_tech(tech) {
            let pattern = format!(r"{}\s+(?:project\s+|app\s+)?(?:called\s+|named\s+)?(\w+)", regex::escape(tech));
            let name = Regex::new(&pattern)
                .ok()
                .and_then(|re| re.captures(lowered).map(|c| c[1].to_string()))
                .filter(|n| !matches!(n.as_str(), "project" | "app" | "called" | "named"))
                .unwrap_or_else(|| format!("{}_project", tech));
            return Intent::of(kind).with_name(name).with_confidence(0.8);
        }
    }

    if has("create") && has("project") {
        return Intent { ambiguous: true, ..Intent::of(IntentKind::CreateProject) }.with_confidence(0.6);
    }
    if has("create") && has("folder") {
        let path = CREATE_FOLDER.captures(lowered).map(|c| c[1].trim().to_string()).unwrap_or_else(|| "./new_folder".to_string());
        return Intent { action: Some("create_folder".to_string()), path: Some(path), ..Default::default() }.with_confidence(0.8);
    }
    if has("create") && has("file") {
        let path = CREATE_FILE.captures(lowered).map(|c| c[1].trim().to_string()).unwrap_or_else(|| "./new_file.txt".to_string());
        return Intent { action: Some("create_file".to_string()), path: Some(path), ..Default::default() }.with_confidence(0.7);
    }
    if has("delete") {
        let path = lowered.replace("delete", "").replace("folder", "").replace("file", "").replace(" the ", " ");
        let kind = if has("folder") { IntentKind::DeleteFolder } else { IntentKind::DeleteFile };
        return Intent { path: Some(path.trim().to_string()), requires_confirmation: true, ..Intent::of(kind) }.with_confidence(0.7);
    }
    if has("run") || has("start") {
        return Intent::of(IntentKind::RunProject).with_confidence(0.7);
    }
    if has("install") {
        return Intent::of(IntentKind::InstallDependencies).with_confidence(0.7);
    }
    if has("open") {
        return Intent::of(IntentKind::OpenProject).with_confidence(0.7);
    }
    if has("help") {
        return Intent::of(IntentKind::Help).with_confidence(0.8);
    }
    if has("status") || has("what's happening") {
        return Intent::of(IntentKind::Status).with_confidence(0.8);
    }
    if has("are you there") {
        return Intent::of(IntentKind::Status).with_confidence(0.9);
    }

    let steps: Vec<String> = CHAIN.split(lowered).map(str::trim).filter(|s| !s.is_empty()).map(step_name).collect();
    if steps.len() > 1 {
        return Intent { steps, ..Intent::of(IntentKind::Pipeline) }.with_confidence(0.8);
    }

    Intent::default().with_confidence(0.5)
}

/// Confidence for model answers that did not state one.
fn infer_confidence(intent: &Intent) -> f64 {
    let mut confidence = if intent.intent.is_some() { 0.9 } else { 0.5 };
    if intent.parameters.as_ref().is_some_and(|p| !p.is_null()) {
        confidence = f64::min(0.98, confidence + 0.05);
    }
    confidence
}

/// Turns user text into intents.
#[derive(Clone)]
pub struct IntentExtractor {
    memory: Memory,
    llm: Arc<LlmClient>,
    session: SharedSession,
}

impl IntentExtractor {
    pub fn new(memory: Memory, llm: Arc<LlmClient>, session: SharedSession) -> Self {
        Self { memory, llm, session }
    }

    /// Extract an intent from `text`. Never fails: the rule fallback always
    /// produces something, possibly an intent with only the raw text.
    pub async fn extract(&self, text: &str) -> Intent {
        {
            let mut session = self.session.lock();
            session.add_to_context("user", text);
            session.last_command = Some(text.to_string());
        }

        let lowered = normalize(text);
        let intent = match fast_path(&lowered) {
            Some(intent) => intent.with_source("rules"),
            None => match self.from_model(text, &lowered).await {
                Ok(intent) => intent,
                Err(e) => {
                    warn!("Intent extraction fell back to rules: {}", e);
                    fallback(&lowered).with_source("fallback")
                }
            },
        };

        debug!("Intent: {} (confidence {:.2})", intent.kind_name(), intent.confidence());
        Intent { raw: Some(text.to_string()), ..intent }
    }

    async fn from_model(&self, text: &str, lowered: &str) -> Result<Intent> {
        let prompt = prompt::build(&self.memory, text).await?;
        let response = self.llm.complete(&prompt).await?;
        let json = json_slice(&response).ok_or_else(|| ValError::Llm("no JSON object in answer".to_string()))?;
        let value: Value = serde_json::from_str(json)?;

        let stated = value.get("confidence").and_then(Value::as_f64);
        let mut intent = Intent::from_value(value);
        let confidence = stated.unwrap_or_else(|| infer_confidence(&intent));
        intent.confidence = Some((confidence * 100.0).round() / 100.0);
        intent.source = Some("llm".to_string());

        let vague_create = lowered.contains("create")
            && mentioned_tech(lowered).is_none()
            && matches!(intent.intent, None | Some(IntentKind::CreateProject));
        if intent.confidence() < 0.7 || vague_create {
            intent.ambiguous = true;
            self.session.lock().add_to_context("system", &format!("Clarify: ambiguous {}", intent.kind_name()));
        }

        if let Err(e) = self.memory.log_event(Event::new("intent_extracted").intent(&intent).action("extract")).await {
            warn!("Failed to log extracted intent: {}", e);
        }

        let mut session = self.session.lock();
        session.last_intent = Some(intent.clone());
        session.add_to_context("assistant", &format!("Extracted intent: {}", intent.kind_name()));
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session;

    async fn extractor(responses: &[&str]) -> IntentExtractor {
        let memory = Memory::in_memory().await.unwrap();
        IntentExtractor::new(memory, Arc::new(LlmClient::scripted(responses)), session::shared())
    }

    #[test]
    fn test_fast_path_memory_commands() {
        let intent = fast_path("remember that my editor is neovim").unwrap();
        assert!(intent.is(&IntentKind::Remember));
        assert_eq!(intent.arg("key").as_deref(), Some("my editor"));
        assert_eq!(intent.arg("value").as_deref(), Some("neovim"));

        let intent = fast_path("what did i say about my editor").unwrap();
        assert!(intent.is(&IntentKind::Recall));
        assert_eq!(intent.arg("key").as_deref(), Some("my editor"));

        assert!(fast_path("forget about my editor").unwrap().is(&IntentKind::Forget));
    }

    #[test]
    fn test_fast_path_dialogue_words() {
        assert_eq!(fast_path("go ahead").unwrap().response.as_deref(), Some("confirm"));
        assert_eq!(fast_path("confirm critical").unwrap().response.as_deref(), Some("confirm"));
        assert_eq!(fast_path("never mind").unwrap().response.as_deref(), Some("cancel"));
        assert!(fast_path("stop val").unwrap().is(&IntentKind::Stop));
    }

    #[test]
    fn test_fast_path_analysis_and_undo() {
        assert_eq!(fast_path("explain this file app.py").unwrap().file.as_deref(), Some("app.py"));
        assert_eq!(fast_path("which files call the login function").unwrap().function.as_deref(), Some("login"));
        assert_eq!(fast_path("undo the last 3 operations").unwrap().count, Some(3));
        assert!(fast_path("undo last").unwrap().is(&IntentKind::Undo));
        assert!(fast_path("show undo history").unwrap().is(&IntentKind::ListUndo));
        assert!(fast_path("what's missing from this project").unwrap().is(&IntentKind::QuickHealth));
    }

    #[test]
    fn test_fast_path_goals_apps_and_triggers() {
        assert_eq!(fast_path("open code").unwrap().name.as_deref(), Some("code"));
        assert_eq!(fast_path("switch to whisper mode").unwrap().mode.as_deref(), Some("whisper"));
        assert_eq!(fast_path("set goal ship the api").unwrap().description.as_deref(), Some("ship the api"));
        assert_eq!(fast_path("complete goal 4").unwrap().arg("goal_id").as_deref(), Some("4"));

        let trigger = fast_path("when files change run tests").unwrap();
        assert!(trigger.is(&IntentKind::AddTrigger));
        assert_eq!(trigger.arg("action").as_deref(), Some("tests"));
        assert_eq!(trigger.arg("condition").as_deref(), Some("file_changed"));
    }

    #[test]
    fn test_fast_path_chains_and_ambiguity() {
        let pipeline = fast_path("create react app, install deps and then run it").unwrap();
        assert!(pipeline.is(&IntentKind::Pipeline));
        assert_eq!(pipeline.steps, vec!["create_react_project", "install_dependencies", "run_project"]);

        let vague = fast_path("create project").unwrap();
        assert!(vague.ambiguous);
        assert!(vague.confidence() < 0.7);

        assert!(fast_path("make me a sandwich").is_none());
    }

    #[test]
    fn test_fallback_rules() {
        let flask = fallback("create a flask app called shop");
        assert!(flask.is(&IntentKind::CreateFlaskProject));
        assert_eq!(flask.name.as_deref(), Some("shop"));

        assert_eq!(fallback("new react app").name.as_deref(), Some("react_project"));

        let folder = fallback("create a folder notes");
        assert_eq!(folder.action.as_deref(), Some("create_folder"));
        assert_eq!(folder.path.as_deref(), Some("notes"));

        let delete = fallback("delete the old folder");
        assert!(delete.is(&IntentKind::DeleteFolder));
        assert!(delete.requires_confirmation);
        assert_eq!(delete.path.as_deref(), Some("old"));

        let unknown = fallback("tell a joke");
        assert!(unknown.intent.is_none());
        assert_eq!(unknown.confidence(), 0.5);
    }

    #[test]
    fn test_fallback_learns_workflow() {
        let intent = fallback("from now on after creating flask project add docker and open code");
        assert!(intent.is(&IntentKind::RememberWorkflow));
        let trigger = intent.trigger.unwrap();
        assert_eq!(trigger.intent, "create_flask_project");
        assert_eq!(intent.actions, vec!["add_docker", "open_vscode"]);
    }

    #[tokio::test]
    async fn test_model_answer_is_post_processed() {
        let extractor = extractor(&["Sure: {\"intent\": \"create_react_project\", \"name\": \"shop\", \"parameters\": {\"x\": 1}}"]).await;
        let intent = extractor.extract("build a react storefront named shop").await;

        assert!(intent.is(&IntentKind::CreateReactProject));
        assert_eq!(intent.confidence, Some(0.95));
        assert!(!intent.ambiguous);
        assert_eq!(intent.raw.as_deref(), Some("build a react storefront named shop"));
        assert_eq!(intent.source.as_deref(), Some("llm"));

        let events = extractor.memory.recent_events(1).await.unwrap();
        assert_eq!(events[0].event_type, "intent_extracted");
        assert!(extractor.session.lock().last_intent.is_some());
    }

    #[tokio::test]
    async fn test_vague_create_is_ambiguous() {
        let extractor = extractor(&["{\"intent\": \"create_project\", \"confidence\": 0.9}"]).await;
        let intent = extractor.extract("create something cool").await;
        assert!(intent.ambiguous);
    }

    #[tokio::test]
    async fn test_offline_model_uses_fallback() {
        let extractor = extractor(&[]).await;
        let intent = extractor.extract("please install everything").await;
        assert!(intent.is(&IntentKind::InstallDependencies));
        assert_eq!(intent.source.as_deref(), Some("fallback"));
        assert_eq!(extractor.session.lock().last_command.as_deref(), Some("please install everything"));
    }
}
