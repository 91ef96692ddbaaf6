//! Intent routing.
//!
//! [`Router::route`] maps one [`Intent`] to the engine, memory and blueprint
//! calls that fulfil it and reports an [`Outcome`]. The router never talks to
//! the user; questions and confirmations travel back to the daemon as
//! [`Outcome::Ask`] and [`Outcome::Confirm`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::analyzer::CodeAnalyzer;
use super::env::ProjectKind;
use super::process::Cmd;
use super::undo::UndoManager;
use super::{apps, commands, deps, docker, env, git, health, scaffold};
use crate::agent::{critic, planner};
use crate::blueprint::{Blueprint, BlueprintGenerator, ProjectTemplate, flutter_fallback};
use crate::intent::{Intent, IntentKind};
use crate::llm::LlmClient;
use crate::memory::{Event, Memory, RiskLevel, SafetyAction};
use crate::session::{ProjectRef, SharedSession, Slot, VoiceMode, WorkflowRecording};

const HELP: &str = "I can create projects (Flask, Django, Flutter, React, Vue, Svelte, Node, web, data science or anything you describe), \
create and delete files and folders, run projects and install dependencies, undo changes, manage Git, .env files and dependencies, \
analyze code and project health, remember facts and workflows, run pipelines and work on goals on my own.";

/// Steps of the built-in `<tech>_full_setup` pipeline.
fn full_setup_steps(tech: &str) -> Vec<String> {
    vec![format!("create_{}_project", tech), "install_dependencies".into(), "git_init".into(), "open_vscode".into()]
}

type RouteFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome>> + Send + 'a>>;

/// Result of routing one intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(String),
    Failed(String),
    /// A required argument is missing.
    Ask { question: String, slot: Slot, intent: Box<Intent> },
    /// The intent must be confirmed first. `intent` is already marked confirmed.
    Confirm { question: String, intent: Box<Intent>, level: RiskLevel },
    /// The user asked VAL to shut down.
    Stop,
}

impl Outcome {
    /// Text to speak for this outcome.
    pub fn message(&self) -> &str {
        match self {
            Outcome::Done(text) | Outcome::Failed(text) => text,
            Outcome::Ask { question, .. } | Outcome::Confirm { question, .. } => question,
            Outcome::Stop => "Goodbye!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Done(_) | Outcome::Stop)
    }

    fn from_result(result: Result<String>) -> Self {
        match result {
            Ok(text) => Outcome::Done(text),
            Err(e) => Outcome::Failed(format!("❌ {:#}", e)),
        }
    }

    fn ask(question: &str, slot: Slot, intent: &Intent) -> Self {
        Outcome::Ask { question: question.to_string(), slot, intent: Box::new(intent.clone()) }
    }
}

/// Autonomous plan after planning and review.
#[derive(Debug)]
pub enum PlanReview {
    Ready(Vec<Intent>),
    /// Nothing to run yet: a failure or a confirmation to ask for.
    Halt(Outcome),
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Executes intents against the engine.
#[derive(Clone)]
pub struct Router {
    memory: Memory,
    session: SharedSession,
    undo: Arc<UndoManager>,
    llm: Arc<LlmClient>,
    blueprints: BlueprintGenerator,
    default_location: PathBuf,
}

impl Router {
    pub fn new(memory: Memory, session: SharedSession, undo: Arc<UndoManager>, llm: Arc<LlmClient>, default_location: PathBuf) -> Self {
        let blueprints = BlueprintGenerator::new(llm.clone());
        Self { memory, session, undo, llm, blueprints, default_location }
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Route an intent. Boxed so pipelines can route their steps recursively.
    pub fn route<'a>(&'a self, intent: &'a Intent) -> RouteFuture<'a> {
        Box::pin(self.dispatch(intent))
    }

    async fn dispatch(&self, intent: &Intent) -> Result<Outcome> {
        debug!("Routing intent: {}", intent.kind_name());
        let Some(kind) = intent.intent.as_ref() else {
            return self.route_untyped(intent).await;
        };

        if let Some(template) = ProjectTemplate::for_kind(kind) {
            return self.create_from_template(intent, template).await;
        }

        let outcome = match kind {
            IntentKind::CreateProject => self.create_custom_project(intent).await?,
            IntentKind::SimilarToLast => self.similar_to_last(intent).await?,
            IntentKind::CreateFolder | IntentKind::CreateFile | IntentKind::DeleteFile | IntentKind::DeleteFolder => self.file_command(intent).await?,
            IntentKind::OpenProject => self.open_project(intent).await?,
            IntentKind::OpenLastProject => self.open_last_project().await?,
            IntentKind::ListProjects => self.list_projects(intent).await?,
            IntentKind::RunProject => self.run_project(intent).await,
            IntentKind::InstallDependencies => self.install_dependencies(intent).await,
            IntentKind::AddDocker => Outcome::from_result(docker::add_docker(&self.project_dir(intent).await, &self.undo)),
            IntentKind::Undo => {
                let outcome = self.undo.undo_last().await;
                if outcome.is_failure() { Outcome::Failed(outcome.to_string()) } else { Outcome::Done(outcome.to_string()) }
            }
            IntentKind::UndoMultiple => self.undo_multiple(intent).await,
            IntentKind::ListUndo => self.list_undo(),
            IntentKind::Stop => Outcome::Stop,
            IntentKind::Help => Outcome::Done(HELP.to_string()),
            IntentKind::Status => self.status().await?,
            IntentKind::Remember => self.remember(intent).await?,
            IntentKind::Recall => self.recall(intent).await?,
            IntentKind::Forget => self.forget(intent).await?,
            IntentKind::RememberWorkflow => self.remember_workflow(intent).await?,
            IntentKind::StartWorkflow => self.start_recording(intent),
            IntentKind::StopWorkflow => self.stop_recording().await?,
            IntentKind::ReplayWorkflow => self.replay_workflow(intent).await?,
            IntentKind::RepeatLastWorkflow => self.repeat_last_workflow().await?,
            IntentKind::ListWorkflows => self.list_workflows().await?,
            IntentKind::DeleteWorkflow => self.delete_workflow(intent).await?,
            IntentKind::Pipeline => self.pipeline(intent).await?,
            IntentKind::ExecutePipeline => self.execute_pipeline(intent).await?,
            IntentKind::AutonomousMode => self.autonomous(intent).await?,
            IntentKind::ExplainFile | IntentKind::FindAuth | IntentKind::ShowRoutes | IntentKind::FindCalls => self.analyze(intent).await,
            IntentKind::CheckHealth => Outcome::Done(health::scan(&self.project_dir(intent).await).await.format()),
            IntentKind::QuickHealth => Outcome::Done(health::scan(&self.project_dir(intent).await).await.quick_summary()),
            IntentKind::OpenApp => self.open_app(intent).await,
            IntentKind::SetVoiceMode => self.set_voice_mode(intent).await?,
            IntentKind::SetGoal => self.set_goal(intent).await?,
            IntentKind::ListGoals => self.list_goals().await?,
            IntentKind::CompleteGoal => self.complete_goal(intent).await?,
            IntentKind::AddTrigger => self.add_trigger(intent).await?,
            IntentKind::GitInit
            | IntentKind::GitCommit
            | IntentKind::GitBranch
            | IntentKind::GitPush
            | IntentKind::GitUndo
            | IntentKind::GitStatus => self.git(kind, intent).await?,
            IntentKind::EnvCreate | IntentKind::EnvLoad | IntentKind::EnvSwitch => self.env(kind, intent).await,
            IntentKind::DepsList
            | IntentKind::DepsOutdated
            | IntentKind::DepsAdd
            | IntentKind::DepsRemove
            | IntentKind::DepsAudit => self.deps(kind, intent).await?,
            _ => self.chat_fallback(intent).await,
        };
        Ok(outcome)
    }

    /// Intents without a kind: dialogue replies, bare file actions, chat.
    async fn route_untyped(&self, intent: &Intent) -> Result<Outcome> {
        match intent.response.as_deref() {
            Some("confirm") => return Ok(Outcome::Done("Nothing is waiting for confirmation.".to_string())),
            Some("cancel") => return Ok(Outcome::Done("Okay.".to_string())),
            _ => {}
        }
        if let (Some(action), Some(path)) = (intent.action.as_deref(), intent.path.as_deref()) {
            let path = self.resolve(intent, path).await;
            return Ok(Outcome::from_result(commands::execute_action(action, &path, &self.undo)));
        }
        Ok(self.chat_fallback(intent).await)
    }

    async fn chat_fallback(&self, intent: &Intent) -> Outcome {
        let Some(raw) = intent.raw.as_deref().filter(|r| !r.trim().is_empty()) else {
            return Outcome::Failed("⚠️ No intent detected".to_string());
        };
        match self.llm.chat(raw).await {
            Ok(reply) => Outcome::Done(reply),
            Err(e) => {
                warn!("Chat fallback failed: {}", e);
                Outcome::Failed("⚠️ No intent detected".to_string())
            }
        }
    }

    /// Working directory of an intent: its location, then the session
    /// project, then the last remembered project, then the current directory.
    pub async fn project_dir(&self, intent: &Intent) -> PathBuf {
        if let Some(location) = intent.arg("location") {
            return expand_home(&location);
        }
        let session_project = self.session.lock().last_project.clone();
        if let Some(project) = session_project {
            return PathBuf::from(project.path);
        }
        match self.memory.last_project().await {
            Ok(Some(project)) => PathBuf::from(project.path),
            _ => PathBuf::from("."),
        }
    }

    /// Absolute paths are kept, relative ones resolve against the project dir.
    async fn resolve(&self, intent: &Intent, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            return expanded;
        }
        let relative = path.trim_start_matches("./");
        self.project_dir(intent).await.join(relative)
    }

    /// Base directory for new projects.
    async fn project_base(&self, intent: &Intent) -> Result<PathBuf> {
        if let Some(location) = intent.arg("location") {
            return Ok(expand_home(&location));
        }
        Ok(match self.memory.preference("default_project_location").await? {
            Some(Value::String(location)) if !location.trim().is_empty() => expand_home(&location),
            _ => self.default_location.clone(),
        })
    }

    fn set_session_project(&self, name: &str, path: &Path) {
        self.session.lock().last_project = Some(ProjectRef { name: name.to_string(), path: path.display().to_string() });
    }

    async fn create_project(&self, name: &str, base: &Path, blueprint: &Blueprint, project_type: &str) -> Result<Outcome> {
        let path = base.join(name);
        let path_text = path.display().to_string();
        let verdict = self.memory.check_safety(&Intent::of(IntentKind::CreateProject), "create project", Some(&path_text)).await?;
        if verdict.action == SafetyAction::Deny {
            return Ok(Outcome::Failed(format!("❌ Blocked: {}", verdict.reason)));
        }

        let report = match scaffold::apply_blueprint(&path, blueprint, &self.undo) {
            Ok(report) => report,
            Err(e) => return Ok(Outcome::Failed(format!("❌ Could not create project: {:#}", e))),
        };
        self.memory.remember_project(name, &path_text, project_type, Some(blueprint)).await?;
        self.set_session_project(name, &path);
        info!("✅ Created {} project at {} ({} files)", project_type, path.display(), report.created_files.len());

        let label = if project_type == "custom" { "AI".to_string() } else { capitalize(project_type) };
        Ok(Outcome::Done(format!("✅ {} project created at {}", label, path.display())))
    }

    /// Project name, or `None` when the user has to be asked. Workflow steps
    /// fall back to the template default instead.
    fn project_name(intent: &Intent, default: &str) -> Option<String> {
        match intent.arg("name") {
            Some(name) => Some(name),
            None if intent.source.as_deref() == Some("workflow") => Some(default.to_string()),
            None => None,
        }
    }

    async fn create_from_template(&self, intent: &Intent, template: ProjectTemplate) -> Result<Outcome> {
        let Some(name) = Self::project_name(intent, template.default_name()) else {
            return Ok(Outcome::ask("What should I name the project?", Slot::Name, intent));
        };
        let base = self.project_base(intent).await?;
        self.create_project(&name, &base, &template.blueprint(&name), template.as_str()).await
    }

    async fn create_custom_project(&self, intent: &Intent) -> Result<Outcome> {
        let Some(name) = Self::project_name(intent, "unnamed_project") else {
            return Ok(Outcome::ask("What should I name the project?", Slot::Name, intent));
        };
        let request = intent.arg("description").or_else(|| intent.raw.clone()).unwrap_or_else(|| name.clone());

        let blueprint = match self.blueprints.generate(&request).await {
            Ok(blueprint) => blueprint,
            Err(_) if request.to_lowercase().contains("flutter") => flutter_fallback(),
            Err(e) => return Ok(Outcome::Failed(format!("❌ Could not generate a blueprint: {}", e))),
        };
        let base = self.project_base(intent).await?;
        self.create_project(&name, &base, &blueprint, "custom").await
    }

    async fn similar_to_last(&self, intent: &Intent) -> Result<Outcome> {
        let Some(last) = self.memory.last_project().await? else {
            return Ok(Outcome::Failed("⚠️ No previous project to copy".to_string()));
        };
        let Some(name) = Self::project_name(intent, &format!("{}_copy", last.name)) else {
            return Ok(Outcome::ask("What should I name the new project?", Slot::Name, intent));
        };
        let project_type = last.project_type.clone().unwrap_or_else(|| "folder".to_string());
        let blueprint = last
            .blueprint()
            .or_else(|| ProjectTemplate::for_project_type(&project_type).map(|t| t.blueprint(&name)))
            .unwrap_or_default();
        let base = Path::new(&last.path).parent().map(Path::to_path_buf).unwrap_or_else(|| self.default_location.clone());
        self.create_project(&name, &base, &blueprint, &project_type).await
    }

    async fn file_command(&self, intent: &Intent) -> Result<Outcome> {
        let Some(target) = intent.arg("path").or_else(|| intent.arg("name")) else {
            return Ok(Outcome::ask("Which path?", Slot::Path, intent));
        };
        let path = self.resolve(intent, &target).await;
        let result = match intent.intent.as_ref() {
            Some(IntentKind::CreateFolder) => commands::create_folder(&path, &self.undo),
            Some(IntentKind::CreateFile) => commands::create_file(&path, "", &self.undo),
            Some(IntentKind::DeleteFile) => commands::delete_file(&path, &self.undo),
            Some(IntentKind::DeleteFolder) if intent.force => commands::force_delete(&path, &self.undo),
            _ => commands::delete_folder(&path, &self.undo),
        };
        Ok(Outcome::from_result(result))
    }

    async fn open_project(&self, intent: &Intent) -> Result<Outcome> {
        let Some(name) = intent.arg("name") else {
            return Ok(Outcome::ask("Which project should I open?", Slot::Name, intent));
        };
        match self.memory.find_project(&name).await? {
            Some(project) => {
                self.memory.touch_project(&project).await?;
                self.set_session_project(&project.name, Path::new(&project.path));
                Ok(Outcome::Done(format!("📂 Opened {} at {}", project.name, project.path)))
            }
            None => Ok(Outcome::Failed(format!("⚠️ I don't know a project called {}", name))),
        }
    }

    async fn open_last_project(&self) -> Result<Outcome> {
        match self.memory.last_project().await? {
            Some(project) => {
                self.memory.touch_project(&project).await?;
                self.set_session_project(&project.name, Path::new(&project.path));
                Ok(Outcome::Done(format!("📂 Opened {} at {}", project.name, project.path)))
            }
            None => Ok(Outcome::Failed("⚠️ No projects yet".to_string())),
        }
    }

    async fn list_projects(&self, intent: &Intent) -> Result<Outcome> {
        let projects = match intent.arg("type") {
            Some(project_type) => self.memory.projects_by_type(&project_type.to_lowercase(), 10).await?,
            None => self.memory.list_projects(10).await?,
        };
        if projects.is_empty() {
            return Ok(Outcome::Done("📁 No projects yet".to_string()));
        }
        let lines: Vec<String> = projects
            .iter()
            .map(|p| format!("- {} ({}) at {}", p.name, p.project_type.as_deref().unwrap_or("folder"), p.path))
            .collect();
        Ok(Outcome::Done(format!("📁 Projects:\n{}", lines.join("\n"))))
    }

    async fn run_project(&self, intent: &Intent) -> Outcome {
        let dir = self.project_dir(intent).await;
        let (label, cmd) = if dir.join("package.json").exists() {
            ("Node project", Cmd::new("npm").arg("start"))
        } else if dir.join("manage.py").exists() {
            ("Django app", Cmd::new("python").args(["manage.py", "runserver"]))
        } else if dir.join("app.py").exists() {
            ("Python app", Cmd::new("python").arg("app.py"))
        } else if dir.join("pubspec.yaml").exists() {
            ("Flutter app", Cmd::new("flutter").arg("run"))
        } else {
            return Outcome::Failed("⚠️ No runnable project detected".to_string());
        };

        let env = self.session.lock().env.clone();
        match cmd.dir(&dir).envs(&env).spawn() {
            Ok(pid) => Outcome::Done(format!("🚀 {} started in {} (pid {})", label, dir.display(), pid)),
            Err(e) => Outcome::Failed(format!("❌ {:#}", e)),
        }
    }

    async fn install_dependencies(&self, intent: &Intent) -> Outcome {
        let dir = self.project_dir(intent).await;
        let cmd = if dir.join("package.json").exists() {
            Cmd::new("npm").arg("install")
        } else if dir.join("requirements.txt").exists() {
            Cmd::new("pip").args(["install", "-r", "requirements.txt"])
        } else if dir.join("pubspec.yaml").exists() {
            Cmd::new("flutter").args(["pub", "get"])
        } else {
            return Outcome::Failed("⚠️ No dependency file found".to_string());
        };

        let display = cmd.display();
        let env = self.session.lock().env.clone();
        let result = cmd.dir(&dir).envs(&env).error_msg("Dependency installation failed").run().await;
        Outcome::from_result(result.map(|_| format!("📦 Dependencies installed ({})", display)))
    }

    async fn undo_multiple(&self, intent: &Intent) -> Outcome {
        let count = intent.count.or_else(|| intent.arg("count").and_then(|c| c.parse().ok())).unwrap_or(1).max(1);
        let outcomes = self.undo.undo_multiple(count as usize).await;
        let failed = outcomes.iter().any(|o| o.is_failure());
        let text = outcomes.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
        if failed { Outcome::Failed(text) } else { Outcome::Done(text) }
    }

    fn list_undo(&self) -> Outcome {
        let entries = self.undo.list_operations(10);
        if entries.is_empty() {
            return Outcome::Done("📝 No operations to undo".to_string());
        }
        let lines: Vec<String> = entries.iter().enumerate().map(|(i, e)| format!("{}. {} ({})", i + 1, e.operation, e.timestamp)).collect();
        Outcome::Done(format!("📝 Recent Operations (can undo):\n{}", lines.join("\n")))
    }

    async fn status(&self) -> Result<Outcome> {
        let stats = self.memory.stats().await?;
        let actions = self.session.lock().actions_count;
        Ok(Outcome::Done(format!(
            "✅ VAL is running and ready. {} actions this session, {} facts and {} projects in memory.",
            actions, stats.facts, stats.projects
        )))
    }

    async fn remember(&self, intent: &Intent) -> Result<Outcome> {
        let (Some(key), Some(value)) = (intent.arg("key"), intent.arg("value")) else {
            return Ok(Outcome::Failed("⚠️ Tell me what to remember, like 'remember my editor is vim'".to_string()));
        };
        self.memory.remember(&key, &json!(value), "fact", None).await?;
        Ok(Outcome::Done(format!("🧠 Remembered {} = {}", key, value)))
    }

    async fn recall(&self, intent: &Intent) -> Result<Outcome> {
        let Some(key) = intent.arg("key") else {
            return Ok(Outcome::Failed("⚠️ What should I recall?".to_string()));
        };
        if let Some(value) = self.memory.recall(&key).await? {
            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            return Ok(Outcome::Done(format!("🧠 {}: {}", key, text)));
        }
        let found = self.memory.search(&key, None, 3).await?;
        if found.is_empty() {
            return Ok(Outcome::Done(format!("🤔 I don't remember anything about {}", key)));
        }
        let lines: Vec<String> = found.iter().map(|f| format!("- {}: {}", f.key, f.json())).collect();
        Ok(Outcome::Done(format!("🧠 Related memories:\n{}", lines.join("\n"))))
    }

    async fn forget(&self, intent: &Intent) -> Result<Outcome> {
        let Some(key) = intent.arg("key") else {
            return Ok(Outcome::Failed("⚠️ What should I forget?".to_string()));
        };
        Ok(if self.memory.forget(&key).await? {
            Outcome::Done(format!("🗑️ Forgot {}", key))
        } else {
            Outcome::Done(format!("🤔 Nothing stored under {}", key))
        })
    }

    async fn remember_workflow(&self, intent: &Intent) -> Result<Outcome> {
        let (Some(trigger), false) = (intent.trigger.as_ref(), intent.actions.is_empty()) else {
            return Ok(Outcome::Failed("⚠️ Tell me when to run what, like 'after creating a react project, init git'".to_string()));
        };
        let workflow = self.memory.remember_workflow(trigger, &intent.actions, "global").await?;
        Ok(Outcome::Done(format!("🔁 Learned: after {} run {}", workflow.trigger.intent, workflow.actions.join(", "))))
    }

    fn start_recording(&self, intent: &Intent) -> Outcome {
        let name = intent.arg("name").unwrap_or_else(|| "my_workflow".to_string());
        self.session.lock().recording = Some(WorkflowRecording { name: name.clone(), steps: Vec::new() });
        Outcome::Done(format!("⏺️ Recording workflow '{}'. Say 'stop recording' when done.", name))
    }

    async fn stop_recording(&self) -> Result<Outcome> {
        let Some(recording) = self.session.lock().recording.take() else {
            return Ok(Outcome::Failed("⚠️ No workflow is being recorded".to_string()));
        };
        if recording.steps.is_empty() {
            return Ok(Outcome::Done(format!("⏹️ Workflow '{}' had no steps, nothing saved", recording.name)));
        }
        self.memory.save_workflow(&recording.name, &recording.steps, None).await?;
        Ok(Outcome::Done(format!("💾 Saved workflow '{}' with {} steps", recording.name, recording.steps.len())))
    }

    async fn replay(&self, name: &str, steps: Vec<String>) -> Result<Outcome> {
        info!("🔁 Replaying workflow '{}'", name);
        let intents: Vec<Intent> = steps.iter().map(|s| Intent::from_step(s)).collect();
        self.run_steps(&intents, false).await
    }

    async fn replay_workflow(&self, intent: &Intent) -> Result<Outcome> {
        let Some(name) = intent.arg("name") else {
            return Ok(Outcome::ask("Which workflow?", Slot::Name, intent));
        };
        match self.memory.execute_workflow(&name).await? {
            Some(steps) => self.replay(&name, steps).await,
            None => Ok(Outcome::Failed(format!("⚠️ No workflow named {}", name))),
        }
    }

    async fn repeat_last_workflow(&self) -> Result<Outcome> {
        let Some(workflow) = self.memory.list_workflows().await?.into_iter().next() else {
            return Ok(Outcome::Failed("⚠️ No workflows saved yet".to_string()));
        };
        let steps = self.memory.execute_workflow(&workflow.name).await?.unwrap_or_default();
        self.replay(&workflow.name, steps).await
    }

    async fn list_workflows(&self) -> Result<Outcome> {
        let workflows = self.memory.list_workflows().await?;
        if workflows.is_empty() {
            return Ok(Outcome::Done("📋 No workflows saved yet".to_string()));
        }
        let lines: Vec<String> = workflows.iter().map(|w| format!("- {}: {} (used {}x)", w.name, w.steps().join(" → "), w.use_count)).collect();
        Ok(Outcome::Done(format!("📋 Workflows:\n{}", lines.join("\n"))))
    }

    async fn delete_workflow(&self, intent: &Intent) -> Result<Outcome> {
        if let Some(trigger) = intent.trigger.as_ref() {
            return Ok(if self.memory.disable_workflow(trigger, "global").await? {
                Outcome::Done(format!("🔕 I'll stop running workflows after {}", trigger.intent))
            } else {
                Outcome::Failed(format!("⚠️ No learned workflow after {}", trigger.intent))
            });
        }
        let Some(name) = intent.arg("name") else {
            return Ok(Outcome::ask("Which workflow should I delete?", Slot::Name, intent));
        };
        Ok(if self.memory.delete_workflow(&name).await? {
            Outcome::Done(format!("🗑️ Deleted workflow {}", name))
        } else {
            Outcome::Failed(format!("⚠️ No workflow named {}", name))
        })
    }

    /// Run an inline pipeline. Named pipelines given as steps are saved first.
    async fn pipeline(&self, intent: &Intent) -> Result<Outcome> {
        if intent.plan.is_empty()
            && !intent.steps.is_empty()
            && let Some(name) = intent.arg("name")
        {
            self.memory.remember_pipeline(&name, &intent.steps, "global").await?;
            info!("💾 Saved pipeline {}", name);
        }
        let steps = if intent.plan.is_empty() { intent.steps.iter().map(|s| Intent::from_step(s)).collect() } else { intent.plan.clone() };
        self.run_steps(&steps, intent.confirmed).await
    }

    async fn execute_pipeline(&self, intent: &Intent) -> Result<Outcome> {
        let Some(name) = intent.arg("name") else {
            return Ok(Outcome::ask("Which pipeline?", Slot::Name, intent));
        };
        let steps = match self.memory.pipeline(&name, "global").await? {
            Some(pipeline) if pipeline.enabled => pipeline.steps,
            Some(_) => return Ok(Outcome::Failed(format!("⚠️ Pipeline {} is disabled", name))),
            None => match name.strip_suffix("_full_setup") {
                Some(tech) if IntentKind::for_tech(tech).is_some() => full_setup_steps(tech),
                _ => return Ok(Outcome::Failed(format!("⚠️ No pipeline named {}", name))),
            },
        };
        let intents: Vec<Intent> = steps.iter().map(|s| Intent::from_step(s)).collect();
        self.run_steps(&intents, intent.confirmed).await
    }

    /// Run a plan, planning it with the model first when it is empty.
    async fn autonomous(&self, intent: &Intent) -> Result<Outcome> {
        match self.review_plan(intent).await? {
            PlanReview::Ready(plan) => self.run_steps(&plan, intent.confirmed).await,
            PlanReview::Halt(outcome) => Ok(outcome),
        }
    }

    /// Plan an autonomous intent if needed and put the plan through the
    /// critic. High-risk plans come back as a confirmation unless the intent
    /// is already confirmed.
    pub async fn review_plan(&self, intent: &Intent) -> Result<PlanReview> {
        let plan = if intent.plan.is_empty() {
            let goal = intent.arg("description").or_else(|| intent.raw.clone()).unwrap_or_default();
            if goal.trim().is_empty() {
                return Ok(PlanReview::Halt(Outcome::Failed("⚠️ What should I work on?".to_string())));
            }
            match planner::plan(&self.llm, &goal).await {
                Ok(plan) if !plan.is_empty() => plan,
                Ok(_) => return Ok(PlanReview::Halt(Outcome::Failed("⚠️ I couldn't come up with a plan".to_string()))),
                Err(e) => return Ok(PlanReview::Halt(Outcome::Failed(format!("❌ Planning failed: {}", e)))),
            }
        } else {
            intent.plan.clone()
        };

        let critique = critic::critique(&plan);
        if critique.risk == critic::Risk::High && !intent.confirmed {
            let confirmed = Intent { plan, confirmed: true, ..intent.clone() };
            return Ok(PlanReview::Halt(Outcome::Confirm {
                question: format!("This plan is high risk: {}. Should I go ahead?", critique.reason),
                intent: Box::new(confirmed),
                level: RiskLevel::Dangerous,
            }));
        }
        Ok(PlanReview::Ready(plan))
    }

    /// Run steps in order. Denied steps are skipped; the first step needing
    /// confirmation stops the run and hands the remaining steps back as a
    /// confirmed pipeline. `pre_confirmed` covers the first step only.
    pub async fn run_steps(&self, steps: &[Intent], pre_confirmed: bool) -> Result<Outcome> {
        let mut results = Vec::new();
        let mut confirmed = pre_confirmed;

        for (i, step) in steps.iter().enumerate() {
            let verdict = self.memory.check_safety(step, step.kind_name(), step.path.as_deref()).await?;
            match verdict.action {
                SafetyAction::Deny => {
                    results.push(format!("Blocked: {}", verdict.reason));
                    continue;
                }
                SafetyAction::Confirm if !confirmed && !step.confirmed => {
                    let remaining = Intent { plan: steps[i..].to_vec(), confirmed: true, ..Intent::of(IntentKind::Pipeline) };
                    let mut question = results.join("\n");
                    if !question.is_empty() {
                        question.push('\n');
                    }
                    question.push_str(&format!("Step {} ({}) needs confirmation: {}. Confirm?", i + 1, step.kind_name(), verdict.reason));
                    return Ok(Outcome::Confirm { question, intent: Box::new(remaining), level: verdict.level });
                }
                _ => {}
            }
            confirmed = false;

            let outcome = self.route(step).await?;
            let event = Event::new("pipeline_step").intent(step).result(outcome.message()).success(outcome.is_success());
            if let Err(e) = self.memory.log_event(event).await {
                warn!("Failed to log pipeline step: {}", e);
            }
            match outcome {
                Outcome::Stop => break,
                Outcome::Ask { question, .. } => results.push(format!("Skipped {}: {}", step.kind_name(), question)),
                Outcome::Confirm { question, .. } => results.push(format!("Skipped {}: {}", step.kind_name(), question)),
                other => results.push(other.message().to_string()),
            }
        }

        let names: Vec<&str> = steps.iter().map(Intent::kind_name).collect();
        self.memory
            .log_event(Event::new("pipeline_executed").data(json!({"steps": names, "results": results})))
            .await?;
        Ok(Outcome::Done(results.join("\n")))
    }

    /// Apply learned workflows triggered by a successful intent.
    ///
    /// A step that needs confirmation stops here and comes back as
    /// `Outcome::Confirm` holding that step and every workflow step after it.
    pub async fn after_intent(&self, intent: &Intent, outcome: &Outcome) -> Result<Option<Outcome>> {
        if !matches!(outcome, Outcome::Done(_)) || intent.source.as_deref() == Some("workflow") {
            return Ok(None);
        }
        let Some(kind) = intent.intent.as_ref() else {
            return Ok(None);
        };
        if !self.memory.preference_bool("auto_apply_workflows", true).await? {
            return Ok(None);
        }

        let workflows = self.memory.workflows_for_trigger(kind.as_str(), kind.tech(), "global").await?;
        let mut applied = Vec::new();
        for (n, workflow) in workflows.iter().enumerate() {
            let steps: Vec<Intent> = workflow.actions.iter().map(|a| Intent::from_step(a)).collect();
            match self.run_steps(&steps, false).await? {
                Outcome::Confirm { question, intent: mut remaining, level } => {
                    for later in &workflows[n + 1..] {
                        remaining.plan.extend(later.actions.iter().map(|a| Intent::from_step(a)));
                    }
                    remaining.source = Some("workflow".to_string());
                    let question = if applied.is_empty() {
                        format!("🔁 Workflow after {}: {}", kind.as_str(), question)
                    } else {
                        format!("🔁 Auto-applied workflow: {}\n{}", applied.join("; "), question)
                    };
                    return Ok(Some(Outcome::Confirm { question, intent: remaining, level }));
                }
                done => applied.push(format!("{} ({})", workflow.actions.join(", "), done.message())),
            }
        }
        if applied.is_empty() {
            return Ok(None);
        }
        Ok(Some(Outcome::Done(format!("🔁 Auto-applied workflow: {}", applied.join("; ")))))
    }

    async fn analyze(&self, intent: &Intent) -> Outcome {
        let analyzer = CodeAnalyzer::new(self.project_dir(intent).await);
        match intent.intent.as_ref() {
            Some(IntentKind::ExplainFile) => match intent.arg("file").or_else(|| intent.arg("path")) {
                Some(file) => Outcome::Done(analyzer.explain_file(&file)),
                None => Outcome::ask("Which file?", Slot::Path, intent),
            },
            Some(IntentKind::FindAuth) => Outcome::Done(analyzer.find_auth_handlers()),
            Some(IntentKind::FindCalls) => match intent.arg("function") {
                Some(function) => Outcome::Done(analyzer.find_function_calls(&function)),
                None => Outcome::Failed("⚠️ Which function?".to_string()),
            },
            _ => Outcome::Done(analyzer.show_api_routes()),
        }
    }

    async fn open_app(&self, intent: &Intent) -> Outcome {
        let name = intent.arg("name").unwrap_or_else(|| "code".to_string());
        let target = self.project_dir(intent).await;
        let result = match apps::App::parse(&name) {
            Some(apps::App::Editor) => apps::open_editor(&target),
            _ => apps::open_app(&name, &target),
        };
        Outcome::from_result(result)
    }

    async fn set_voice_mode(&self, intent: &Intent) -> Result<Outcome> {
        let mode = match intent.arg("mode").as_deref() {
            Some("whisper") => VoiceMode::Whisper,
            _ => VoiceMode::Normal,
        };
        let name = if mode == VoiceMode::Whisper { "whisper" } else { "normal" };
        self.session.lock().voice_mode = mode;
        self.memory.set_preference("voice_mode", &json!(name), "voice").await?;
        Ok(Outcome::Done(format!("🔈 Voice mode set to {}", name)))
    }

    async fn set_goal(&self, intent: &Intent) -> Result<Outcome> {
        let Some(description) = intent.arg("description").or_else(|| intent.arg("name")) else {
            return Ok(Outcome::Failed("⚠️ What is the goal?".to_string()));
        };
        let id = self.memory.add_goal(&description, 1, None).await?;
        Ok(Outcome::Done(format!("🎯 Goal #{} set: {}", id, description)))
    }

    async fn list_goals(&self) -> Result<Outcome> {
        let goals = self.memory.active_goals().await?;
        if goals.is_empty() {
            return Ok(Outcome::Done("🎯 No active goals".to_string()));
        }
        let lines: Vec<String> = goals.iter().map(|g| format!("#{} {} (priority {})", g.id, g.description, g.priority)).collect();
        Ok(Outcome::Done(format!("🎯 Active goals:\n{}", lines.join("\n"))))
    }

    async fn complete_goal(&self, intent: &Intent) -> Result<Outcome> {
        let Some(id) = intent.arg("goal_id").and_then(|id| id.parse::<i64>().ok()) else {
            return Ok(Outcome::Failed("⚠️ Which goal number?".to_string()));
        };
        Ok(if self.memory.update_goal_status(id, "completed").await? {
            Outcome::Done(format!("🎉 Goal #{} completed", id))
        } else {
            Outcome::Failed(format!("⚠️ No goal #{}", id))
        })
    }

    async fn add_trigger(&self, intent: &Intent) -> Result<Outcome> {
        let Some(action) = intent.arg("action") else {
            return Ok(Outcome::Failed("⚠️ What should the trigger run?".to_string()));
        };
        let trigger_type = intent.arg("type").unwrap_or_else(|| "event".to_string());
        let condition = intent.arg("condition").unwrap_or_else(|| "file_changed".to_string());
        let id = self.memory.add_trigger(&trigger_type, &condition, &action, 0.8).await?;
        Ok(Outcome::Done(format!("⚡ Trigger #{} added: on {} run {}", id, condition, action)))
    }

    async fn review_git(&self, intent: &Intent, args: &[&str]) -> Result<Option<Outcome>> {
        if intent.confirmed {
            return Ok(None);
        }
        Ok(match git::review(&self.memory, args).await? {
            git::GitReview::Allow => None,
            git::GitReview::Deny(reason) => Some(Outcome::Failed(format!("❌ Blocked: {}", reason))),
            git::GitReview::Confirm { question, level } => Some(Outcome::Confirm {
                question: format!("{}. Confirm?", question.trim_end_matches('.')),
                intent: Box::new(Intent { confirmed: true, ..intent.clone() }),
                level,
            }),
        })
    }

    async fn git(&self, kind: &IntentKind, intent: &Intent) -> Result<Outcome> {
        let cwd = self.project_dir(intent).await;
        let result = match kind {
            IntentKind::GitInit => git::init(&self.memory, &cwd, intent.arg("remote").as_deref()).await,
            IntentKind::GitCommit => {
                let message = intent.arg("message").unwrap_or_else(|| "Update from VAL".to_string());
                git::commit(&self.memory, &cwd, &message, &self.undo).await
            }
            IntentKind::GitBranch => match intent.arg("name") {
                Some(name) => git::branch(&self.memory, &cwd, &name).await,
                None => return Ok(Outcome::ask("What should the branch be called?", Slot::Name, intent)),
            },
            IntentKind::GitPush => {
                let remote = intent.arg("remote").unwrap_or_else(|| "origin".to_string());
                if let Some(outcome) = self.review_git(intent, &git::push_args(&remote, intent.force)).await? {
                    return Ok(outcome);
                }
                git::push(&self.memory, &cwd, &remote, intent.force).await
            }
            IntentKind::GitUndo => {
                if let Some(outcome) = self.review_git(intent, &git::UNDO_COMMIT_ARGS).await? {
                    return Ok(outcome);
                }
                git::undo_last_commit(&self.memory, &cwd).await
            }
            _ => git::status(&cwd).await,
        };
        Ok(Outcome::from_result(result))
    }

    async fn env(&self, kind: &IntentKind, intent: &Intent) -> Outcome {
        let cwd = self.project_dir(intent).await;
        let config = intent.arg("config").unwrap_or_else(|| "dev".to_string());
        let result = match kind {
            IntentKind::EnvCreate => {
                let project_kind = intent.arg("type").as_deref().and_then(ProjectKind::parse);
                env::create_env(&self.memory, &cwd, project_kind).await.map(|(project_kind, vars)| {
                    let keys = vars.keys().cloned().collect::<Vec<_>>().join(", ");
                    self.session.lock().env.extend(vars);
                    format!("✅ .env created for {} at {}\nLoaded: {}", project_kind.as_str(), cwd.display(), keys)
                })
            }
            IntentKind::EnvSwitch => env::switch_config(&self.memory, &cwd, &config).await.map(|vars| {
                self.session.lock().env.extend(vars);
                format!("🔀 Switched to {} config", config)
            }),
            _ => env::load_env(&self.memory, &cwd, &config).await.map(|vars| {
                let keys = vars.keys().take(5).cloned().collect::<Vec<_>>().join(", ");
                self.session.lock().env.extend(vars);
                format!("📂 .env loaded ({}) from {}. Vars: {}", config, cwd.display(), keys)
            }),
        };
        Outcome::from_result(result)
    }

    async fn deps(&self, kind: &IntentKind, intent: &Intent) -> Result<Outcome> {
        let cwd = self.project_dir(intent).await;
        let name = intent.arg("name");
        let outcome = match kind {
            IntentKind::DepsList => Outcome::from_result(deps::list(&self.memory, &cwd).await.map(|(kind, list)| deps::summarize(kind, &list))),
            IntentKind::DepsOutdated => match deps::outdated(&cwd).await {
                Ok(Some(report)) if !report.trim().is_empty() => Outcome::Done(format!("📦 Outdated:\n{}", report)),
                Ok(Some(_)) => Outcome::Done("✅ All dependencies are up to date".to_string()),
                Ok(None) => Outcome::Failed("⚠️ No dependency manager detected".to_string()),
                Err(e) => Outcome::Failed(format!("❌ {:#}", e)),
            },
            IntentKind::DepsAdd => match name {
                Some(name) => Outcome::from_result(deps::add(&self.memory, &cwd, &name, intent.dev, &self.undo).await),
                None => Outcome::ask("Which package?", Slot::Name, intent),
            },
            IntentKind::DepsRemove => {
                let Some(name) = name else {
                    return Ok(Outcome::ask("Which package?", Slot::Name, intent));
                };
                if !intent.confirmed {
                    let verdict = self.memory.check_safety(intent, &format!("remove dependency {}", name), None).await?;
                    match verdict.action {
                        SafetyAction::Deny => return Ok(Outcome::Failed(format!("❌ Blocked: {}", verdict.reason))),
                        SafetyAction::Confirm => {
                            return Ok(Outcome::Confirm {
                                question: format!("Remove {}? {}. Confirm?", name, verdict.reason),
                                intent: Box::new(Intent { confirmed: true, ..intent.clone() }),
                                level: verdict.level,
                            });
                        }
                        SafetyAction::Allow => {}
                    }
                }
                Outcome::from_result(deps::remove(&self.memory, &cwd, &name).await)
            }
            _ => {
                let project_kind = ProjectKind::detect(&cwd);
                match name {
                    Some(name) => Outcome::Done(deps::audit(&name, project_kind)),
                    None => Outcome::from_result(deps::list(&self.memory, &cwd).await.map(|(kind, list)| {
                        if list.is_empty() {
                            "📦 No dependencies to audit".to_string()
                        } else {
                            list.iter().map(|d| deps::audit(d, kind)).collect::<Vec<_>>().join("\n")
                        }
                    })),
                }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::WorkflowTrigger;
    use crate::session;

    struct Fixture {
        router: Router,
        memory: Memory,
        session: SharedSession,
        dir: tempfile::TempDir,
    }

    async fn fixture(llm: LlmClient) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::in_memory().await.unwrap();
        let session = session::shared();
        let undo = Arc::new(UndoManager::open(&dir.path().join("logs"), memory.clone()).unwrap());
        let router = Router::new(memory.clone(), session.clone(), undo, Arc::new(llm), dir.path().join("projects"));
        Fixture { router, memory, session, dir }
    }

    #[tokio::test]
    async fn test_create_template_project() {
        let f = fixture(LlmClient::offline()).await;
        let intent = Intent::of(IntentKind::CreateFlaskProject).with_name("shop");

        let outcome = f.router.route(&intent).await.unwrap();
        let path = f.dir.path().join("projects/shop");
        assert_eq!(outcome, Outcome::Done(format!("✅ Flask project created at {}", path.display())));
        assert!(path.join("app/__init__.py").exists());

        let last = f.memory.last_project().await.unwrap().unwrap();
        assert_eq!(last.name, "shop");
        assert_eq!(last.project_type.as_deref(), Some("flask"));
        assert_eq!(f.session.lock().last_project.as_ref().unwrap().name, "shop");
    }

    #[tokio::test]
    async fn test_missing_name_asks_unless_workflow() {
        let f = fixture(LlmClient::offline()).await;
        let intent = Intent::of(IntentKind::CreateReactProject);
        match f.router.route(&intent).await.unwrap() {
            Outcome::Ask { slot, .. } => assert_eq!(slot, Slot::Name),
            other => panic!("expected a question, got {:?}", other),
        }

        let step = Intent::from_step("create_react_project");
        assert!(f.router.route(&step).await.unwrap().is_success());
        assert!(f.dir.path().join("projects/react_app/package.json").exists());
    }

    #[tokio::test]
    async fn test_custom_project_from_model() {
        let answer = r#"{"folders": ["src"], "files": [{"path": "src/main.py", "content": "print('hi')"}]}"#;
        let f = fixture(LlmClient::scripted(&[answer])).await;
        let intent = Intent { raw: Some("a python script project".into()), ..Intent::of(IntentKind::CreateProject).with_name("tool") };

        assert!(f.router.route(&intent).await.unwrap().message().starts_with("✅ AI project created"));
        let main = f.dir.path().join("projects/tool/src/main.py");
        assert_eq!(std::fs::read_to_string(main).unwrap(), "print('hi')");
    }

    #[tokio::test]
    async fn test_file_commands_resolve_against_project() {
        let f = fixture(LlmClient::offline()).await;
        f.router.route(&Intent::of(IntentKind::CreateWebProject).with_name("site")).await.unwrap();

        let intent = Intent { path: Some("./assets".into()), ..Intent::of(IntentKind::CreateFolder) };
        assert!(f.router.route(&intent).await.unwrap().message().starts_with("📁 Folder created"));
        assert!(f.dir.path().join("projects/site/assets").is_dir());

        let undone = f.router.route(&Intent::of(IntentKind::Undo)).await.unwrap();
        assert!(undone.message().starts_with("↩️ Undone"));
        assert!(!f.dir.path().join("projects/site/assets").exists());
    }

    #[tokio::test]
    async fn test_untyped_action_and_replies() {
        let f = fixture(LlmClient::offline()).await;
        let location = f.dir.path().display().to_string();
        let intent = Intent { action: Some("create_file".into()), path: Some("notes.txt".into()), location: Some(location), ..Default::default() };
        assert!(f.router.route(&intent).await.unwrap().is_success());
        assert!(f.dir.path().join("notes.txt").exists());

        let reply = Intent { response: Some("confirm".into()), ..Default::default() };
        assert_eq!(f.router.route(&reply).await.unwrap().message(), "Nothing is waiting for confirmation.");

        let chat = Intent { raw: Some("tell me a joke".into()), ..Default::default() };
        assert_eq!(f.router.route(&chat).await.unwrap(), Outcome::Failed("⚠️ No intent detected".to_string()));
    }

    #[tokio::test]
    async fn test_chat_fallback_uses_model() {
        let f = fixture(LlmClient::scripted(&["Why did the crab never share? Because it's shellfish."])).await;
        let chat = Intent { raw: Some("tell me a joke".into()), ..Default::default() };
        assert!(f.router.route(&chat).await.unwrap().message().contains("shellfish"));
    }

    #[tokio::test]
    async fn test_memory_intents() {
        let f = fixture(LlmClient::offline()).await;
        let remember = Intent { parameters: Some(json!({"key": "editor", "value": "vim"})), ..Intent::of(IntentKind::Remember) };
        f.router.route(&remember).await.unwrap();

        let recall = Intent { parameters: Some(json!({"key": "editor"})), ..Intent::of(IntentKind::Recall) };
        assert_eq!(f.router.route(&recall).await.unwrap().message(), "🧠 editor: vim");

        let forget = Intent { parameters: Some(json!({"key": "editor"})), ..Intent::of(IntentKind::Forget) };
        assert_eq!(f.router.route(&forget).await.unwrap().message(), "🗑️ Forgot editor");
        assert!(f.router.route(&recall).await.unwrap().message().starts_with("🤔"));
    }

    #[tokio::test]
    async fn test_pipeline_stops_for_confirmation() {
        let f = fixture(LlmClient::offline()).await;
        let target = f.dir.path().join("old.txt");
        std::fs::write(&target, "x").unwrap();
        let steps = vec![
            Intent::of(IntentKind::Help),
            Intent { path: Some(target.display().to_string()), ..Intent::of(IntentKind::DeleteFile) },
        ];

        let outcome = f.router.run_steps(&steps, false).await.unwrap();
        let Outcome::Confirm { question, intent, .. } = outcome else {
            panic!("expected confirmation");
        };
        assert!(question.contains("Step 2 (delete_file) needs confirmation"));
        assert!(intent.confirmed);
        assert_eq!(intent.plan.len(), 1);
        assert!(target.exists());

        let resumed = f.router.route(&intent).await.unwrap();
        assert!(resumed.is_success());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_stored_pipeline_runs_in_order() {
        let f = fixture(LlmClient::offline()).await;
        let steps = vec!["create_web_project".to_string(), "list_projects".to_string()];
        f.memory.remember_pipeline("site_setup", &steps, "global").await.unwrap();

        let outcome = f.router.route(&Intent::of(IntentKind::ExecutePipeline).with_name("site_setup")).await.unwrap();
        let text = outcome.message();
        assert!(text.starts_with("✅ Web project created"));
        assert!(text.contains("- website (web)"));
        assert_eq!(f.memory.recent_events(1).await.unwrap()[0].event_type, "pipeline_executed");

        let missing = f.router.route(&Intent::of(IntentKind::ExecutePipeline).with_name("nope")).await.unwrap();
        assert_eq!(missing, Outcome::Failed("⚠️ No pipeline named nope".to_string()));
    }

    #[test]
    fn test_full_setup_default() {
        assert_eq!(full_setup_steps("flask"), ["create_flask_project", "install_dependencies", "git_init", "open_vscode"]);
    }

    #[tokio::test]
    async fn test_learned_workflow_is_applied() {
        let f = fixture(LlmClient::offline()).await;
        let trigger = WorkflowTrigger { intent: "create_web_project".into(), tech: None };
        f.memory.remember_workflow(&trigger, &["create_folder".to_string()], "global").await.unwrap();

        let intent = Intent::of(IntentKind::CreateWebProject).with_name("blog");
        let outcome = f.router.route(&intent).await.unwrap();
        let applied = f.router.after_intent(&intent, &outcome).await.unwrap().unwrap();
        assert!(applied.message().starts_with("🔁 Auto-applied workflow: create_folder"));

        // Workflow steps never trigger further workflows
        let step = Intent::from_step("create_web_project");
        assert_eq!(f.router.after_intent(&step, &outcome).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_learned_workflow_step_waits_for_confirmation() {
        let f = fixture(LlmClient::offline()).await;
        f.memory.add_safety_rule("dangerous_action", "delete", SafetyAction::Confirm, "Removes files").await.unwrap();
        let trigger = WorkflowTrigger { intent: "create_web_project".into(), tech: None };
        f.memory.remember_workflow(&trigger, &["delete_file".to_string(), "git_init".to_string()], "global").await.unwrap();

        let intent = Intent::of(IntentKind::CreateWebProject).with_name("blog");
        let outcome = f.router.route(&intent).await.unwrap();
        match f.router.after_intent(&intent, &outcome).await.unwrap() {
            Some(Outcome::Confirm { question, intent: pending, .. }) => {
                assert!(question.contains("Step 1 (delete_file) needs confirmation: Removes files"));
                assert!(pending.is(&IntentKind::Pipeline));
                assert!(pending.confirmed);
                assert_eq!(pending.source.as_deref(), Some("workflow"));
                let steps: Vec<&str> = pending.plan.iter().map(Intent::kind_name).collect();
                assert_eq!(steps, ["delete_file", "git_init"]);
            }
            other => panic!("expected a confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forget_learned_workflow() {
        let f = fixture(LlmClient::offline()).await;
        let trigger = WorkflowTrigger { intent: "create_web_project".into(), tech: None };
        f.memory.remember_workflow(&trigger, &["git_init".to_string()], "global").await.unwrap();

        let forget = Intent { trigger: Some(trigger.clone()), ..Intent::of(IntentKind::DeleteWorkflow) };
        let outcome = f.router.route(&forget).await.unwrap();
        assert_eq!(outcome, Outcome::Done("🔕 I'll stop running workflows after create_web_project".to_string()));
        assert!(f.memory.workflows_for_trigger("create_web_project", None, "global").await.unwrap().is_empty());
        assert!(!f.router.route(&forget).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_named_inline_pipeline_is_saved() {
        let f = fixture(LlmClient::offline()).await;
        let intent = Intent { steps: vec!["list_goals".into(), "list_projects".into()], ..Intent::of(IntentKind::Pipeline) }.with_name("review");
        assert!(f.router.route(&intent).await.unwrap().is_success());

        let saved = f.memory.pipeline("review", "global").await.unwrap().unwrap();
        assert_eq!(saved.steps, ["list_goals", "list_projects"]);
    }

    #[tokio::test]
    async fn test_list_projects_by_type() {
        let f = fixture(LlmClient::offline()).await;
        f.router.route(&Intent::of(IntentKind::CreateWebProject).with_name("blog")).await.unwrap();
        f.router.route(&Intent::of(IntentKind::CreateFlaskProject).with_name("api")).await.unwrap();

        let intent = Intent { parameters: Some(json!({"type": "Flask"})), ..Intent::of(IntentKind::ListProjects) };
        let text = f.router.route(&intent).await.unwrap().message().to_string();
        assert!(text.contains("- api (flask)"));
        assert!(!text.contains("blog"));
    }

    #[tokio::test]
    async fn test_recording_workflow() {
        let f = fixture(LlmClient::offline()).await;
        f.router.route(&Intent::of(IntentKind::StartWorkflow).with_name("morning")).await.unwrap();
        f.session.lock().recording.as_mut().unwrap().steps.push("git_status".into());

        let saved = f.router.route(&Intent::of(IntentKind::StopWorkflow)).await.unwrap();
        assert_eq!(saved.message(), "💾 Saved workflow 'morning' with 1 steps");
        assert!(f.router.route(&Intent::of(IntentKind::ListWorkflows)).await.unwrap().message().contains("morning: git_status"));
    }

    #[tokio::test]
    async fn test_autonomous_plan_from_model() {
        let plan = r#"{"plan": [{"intent": "set_goal", "description": "ship v1"}, {"intent": "list_goals"}]}"#;
        let f = fixture(LlmClient::scripted(&[plan])).await;
        let intent = Intent { description: Some("get ready to ship".into()), ..Intent::of(IntentKind::AutonomousMode) };

        let outcome = f.router.route(&intent).await.unwrap();
        assert!(outcome.message().contains("ship v1"));
        assert_eq!(f.memory.active_goals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_goals_and_voice_mode() {
        let f = fixture(LlmClient::offline()).await;
        let set = Intent { description: Some("write docs".into()), ..Intent::of(IntentKind::SetGoal) };
        f.router.route(&set).await.unwrap();
        let id = f.memory.active_goals().await.unwrap()[0].id;

        let complete = Intent { parameters: Some(json!({"goal_id": id})), ..Intent::of(IntentKind::CompleteGoal) };
        assert!(f.router.route(&complete).await.unwrap().is_success());
        assert_eq!(f.router.route(&Intent::of(IntentKind::ListGoals)).await.unwrap().message(), "🎯 No active goals");

        let whisper = Intent { mode: Some("whisper".into()), ..Intent::of(IntentKind::SetVoiceMode) };
        f.router.route(&whisper).await.unwrap();
        assert_eq!(f.session.lock().voice_mode, VoiceMode::Whisper);
        assert_eq!(f.memory.preference("voice_mode").await.unwrap(), Some(json!("whisper")));
    }

    #[tokio::test]
    async fn test_force_push_needs_confirmation() {
        let f = fixture(LlmClient::offline()).await;
        let intent = Intent { force: true, location: Some(f.dir.path().display().to_string()), ..Intent::of(IntentKind::GitPush) };
        match f.router.route(&intent).await.unwrap() {
            Outcome::Confirm { intent, level, .. } => {
                assert!(intent.confirmed);
                assert_eq!(level, RiskLevel::Critical);
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_env_create_fills_session() {
        let f = fixture(LlmClient::offline()).await;
        std::fs::write(f.dir.path().join("package.json"), "{}").unwrap();
        let intent = Intent { location: Some(f.dir.path().display().to_string()), ..Intent::of(IntentKind::EnvCreate) };

        assert!(f.router.route(&intent).await.unwrap().message().starts_with("✅ .env created for node"));
        assert!(f.dir.path().join(".env").exists());
        assert!(!f.session.lock().env.is_empty());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/code"), home.join("code"));
        }
    }
}
