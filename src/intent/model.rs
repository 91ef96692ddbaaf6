//! Structured intent produced by extraction and consumed by the router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::WorkflowTrigger;

/// Declares the known intent kinds together with their wire names.
macro_rules! intent_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Intent kind. Unknown names coming from the model are preserved in `Other`.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum IntentKind {
            $($variant,)+
            Other(String),
        }

        impl IntentKind {
            /// Wire name of the kind.
            pub fn as_str(&self) -> &str {
                match self {
                    $(IntentKind::$variant => $name,)+
                    IntentKind::Other(name) => name,
                }
            }

            /// Parse a wire name; unknown names become `Other`.
            pub fn parse(name: &str) -> Self {
                match name {
                    $($name => IntentKind::$variant,)+
                    other => IntentKind::Other(other.to_string()),
                }
            }
        }
    };
}

intent_kinds! {
    CreateFlutterProject => "create_flutter_project",
    CreateFlaskProject => "create_flask_project",
    CreateDjangoProject => "create_django_project",
    CreateReactProject => "create_react_project",
    CreateVueProject => "create_vue_project",
    CreateSvelteProject => "create_svelte_project",
    CreateNodeProject => "create_node_project",
    CreateWebProject => "create_web_project",
    CreateDataProject => "create_data_project",
    CreateProject => "create_project",
    CreateFolder => "create_folder",
    CreateFile => "create_file",
    DeleteFile => "delete_file",
    DeleteFolder => "delete_folder",
    OpenProject => "open_project",
    OpenLastProject => "open_last_project",
    ListProjects => "list_projects",
    SimilarToLast => "similar_to_last",
    RunProject => "run_project",
    InstallDependencies => "install_dependencies",
    AddDocker => "add_docker",
    Undo => "undo",
    UndoMultiple => "undo_multiple",
    ListUndo => "list_undo",
    Stop => "stop",
    Help => "help",
    Status => "status",
    Remember => "remember",
    Recall => "recall",
    Forget => "forget",
    RememberWorkflow => "remember_workflow",
    StartWorkflow => "start_workflow",
    StopWorkflow => "stop_workflow",
    ReplayWorkflow => "replay_workflow",
    RepeatLastWorkflow => "repeat_last_workflow",
    ListWorkflows => "list_workflows",
    DeleteWorkflow => "delete_workflow",
    Pipeline => "pipeline",
    ExecutePipeline => "execute_pipeline",
    AutonomousMode => "autonomous_mode",
    ExplainFile => "explain_file",
    FindAuth => "find_auth",
    ShowRoutes => "show_routes",
    FindCalls => "find_calls",
    CheckHealth => "check_health",
    QuickHealth => "quick_health",
    OpenApp => "open_app",
    SetVoiceMode => "set_voice_mode",
    SetGoal => "set_goal",
    ListGoals => "list_goals",
    CompleteGoal => "complete_goal",
    AddTrigger => "add_trigger",
    GitInit => "git_init",
    GitCommit => "git_commit",
    GitBranch => "git_branch",
    GitPush => "git_push",
    GitUndo => "git_undo",
    GitStatus => "git_status",
    EnvCreate => "env_create",
    EnvLoad => "env_load",
    EnvSwitch => "env_switch",
    DepsList => "deps_list",
    DepsOutdated => "deps_outdated",
    DepsAdd => "deps_add",
    DepsRemove => "deps_remove",
    DepsAudit => "deps_audit",
}

impl From<String> for IntentKind {
    fn from(name: String) -> Self {
        IntentKind::parse(&name)
    }
}

impl From<IntentKind> for String {
    fn from(kind: IntentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntentKind {
    /// Technology implied by a project-creation kind.
    pub fn tech(&self) -> Option<&'static str> {
        match self {
            IntentKind::CreateFlutterProject => Some("flutter"),
            IntentKind::CreateFlaskProject => Some("flask"),
            IntentKind::CreateDjangoProject => Some("django"),
            IntentKind::CreateReactProject => Some("react"),
            IntentKind::CreateVueProject => Some("vue"),
            IntentKind::CreateSvelteProject => Some("svelte"),
            IntentKind::CreateNodeProject => Some("node"),
            IntentKind::CreateWebProject => Some("web"),
            IntentKind::CreateDataProject => Some("data"),
            _ => None,
        }
    }

    /// Project-creation kind for a technology name.
    pub fn for_tech(tech: &str) -> Option<Self> {
        match tech.trim().to_lowercase().as_str() {
            "flutter" | "dart" => Some(IntentKind::CreateFlutterProject),
            "flask" | "python" => Some(IntentKind::CreateFlaskProject),
            "django" => Some(IntentKind::CreateDjangoProject),
            "react" => Some(IntentKind::CreateReactProject),
            "vue" => Some(IntentKind::CreateVueProject),
            "svelte" => Some(IntentKind::CreateSvelteProject),
            "node" | "express" => Some(IntentKind::CreateNodeProject),
            "web" | "website" | "html" => Some(IntentKind::CreateWebProject),
            "data" | "data science" => Some(IntentKind::CreateDataProject),
            _ => None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A structured command.
///
/// Every field is optional because the model answers free-form JSON and the
/// rule paths only fill what they recognise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<Intent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<WorkflowTrigger>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// `confirm` or `cancel` for dialogue replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ambiguous: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub force: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    /// Set once the user confirmed this exact intent.
    #[serde(default, skip_serializing_if = "is_false")]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Intent {
    /// Intent of the given kind with every other field empty.
    pub fn of(kind: IntentKind) -> Self {
        Self { intent: Some(kind), ..Default::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Wire name of the kind, or `none`.
    pub fn kind_name(&self) -> &str {
        self.intent.as_ref().map(IntentKind::as_str).unwrap_or("none")
    }

    pub fn is(&self, kind: &IntentKind) -> bool {
        self.intent.as_ref() == Some(kind)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }

    /// Whether the intent carries nothing actionable.
    pub fn is_empty(&self) -> bool {
        self.intent.is_none() && self.response.is_none() && self.raw.as_deref().is_none_or(|r| r.trim().is_empty())
    }

    /// Named argument from the top-level fields, falling back to `parameters`.
    pub fn arg(&self, key: &str) -> Option<String> {
        let direct = match key {
            "name" => self.name.clone(),
            "location" => self.location.clone(),
            "path" => self.path.clone(),
            "file" => self.file.clone(),
            "function" => self.function.clone(),
            "message" => self.message.clone(),
            "remote" => self.remote.clone(),
            "config" => self.config.clone(),
            "mode" => self.mode.clone(),
            "description" => self.description.clone(),
            _ => None,
        };
        direct.filter(|v| !v.trim().is_empty()).or_else(|| match self.parameters.as_ref()? {
            Value::Object(map) => match map.get(key)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
            _ => None,
        })
    }

    /// Build an intent from a workflow or pipeline step name.
    pub fn from_step(step: &str) -> Self {
        let step = step.trim();
        let intent = match step {
            "open_vscode" | "open_code" | "open_editor" => Intent::of(IntentKind::OpenApp).with_name("code"),
            "open_browser" => Intent::of(IntentKind::OpenApp).with_name("browser"),
            "open_terminal" => Intent::of(IntentKind::OpenApp).with_name("terminal"),
            "git_push_force" => Intent { force: true, ..Intent::of(IntentKind::GitPush) },
            "dockerize" => Intent::of(IntentKind::AddDocker),
            other => Intent::of(IntentKind::parse(other)),
        };
        intent.with_confidence(1.0).with_source("workflow")
    }

    /// Best-effort conversion of loosely typed JSON produced by the model.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Intent>(value.clone()) {
            Ok(intent) => intent,
            Err(_) => {
                let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
                Intent {
                    intent: field("intent").map(IntentKind::from),
                    name: field("name"),
                    path: field("path"),
                    location: field("location"),
                    file: field("file"),
                    confidence: value.get("confidence").and_then(Value::as_f64),
                    parameters: value.get("parameters").cloned(),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_kind_round_trips_by_name() {
        let intent: Intent = serde_json::from_value(json!({"intent": "make_coffee", "confidence": 0.4})).unwrap();
        assert_eq!(intent.intent, Some(IntentKind::Other("make_coffee".to_string())));
        assert_eq!(serde_json::to_value(&intent).unwrap()["intent"], "make_coffee");
    }

    #[test]
    fn test_arg_falls_back_to_parameters() {
        let intent = Intent { parameters: Some(json!({"name": "api", "count": 2})), ..Intent::of(IntentKind::CreateFlaskProject) };
        assert_eq!(intent.arg("name").as_deref(), Some("api"));
        assert_eq!(intent.arg("count").as_deref(), Some("2"));
        assert_eq!(intent.arg("path"), None);
    }

    #[test]
    fn test_from_value_tolerates_bad_field_types() {
        let intent = Intent::from_value(json!({"intent": "undo_multiple", "count": "three", "name": "x"}));
        assert!(intent.is(&IntentKind::UndoMultiple));
        assert_eq!(intent.count, None);
        assert_eq!(intent.name.as_deref(), Some("x"));
    }

    #[test]
    fn test_step_aliases() {
        let step = Intent::from_step("open_vscode");
        assert!(step.is(&IntentKind::OpenApp));
        assert_eq!(step.name.as_deref(), Some("code"));
        assert_eq!(Intent::from_step("git_status").kind_name(), "git_status");
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let text = serde_json::to_string(&Intent::of(IntentKind::Help)).unwrap();
        assert_eq!(text, r#"{"intent":"help"}"#);
    }
}
