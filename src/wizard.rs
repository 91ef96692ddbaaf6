//! Interactive project wizard.
//!
//! The default front end when VAL is started without `--daemon`: asks where
//! and what to create, previews the blueprint and scaffolds it after a
//! confirmation.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::agent::{critic, planner};
use crate::blueprint::{Blueprint, BlueprintGenerator, ProjectTemplate, flutter_fallback};
use crate::engine::{Router, scaffold};
use crate::intent::Intent;
use crate::llm::LlmClient;
use crate::memory::Memory;
use crate::session::{ProjectRef, SharedSession};

const MANUAL_CHOICES: [(&str, ProjectTemplate); 7] = [
    ("1", ProjectTemplate::Folder),
    ("3", ProjectTemplate::Flask),
    ("4", ProjectTemplate::Flutter),
    ("5", ProjectTemplate::React),
    ("6", ProjectTemplate::Node),
    ("7", ProjectTemplate::Web),
    ("8", ProjectTemplate::Data),
];

/// A blueprint chosen for the project, with the type it is remembered as.
type Choice = Option<(Blueprint, String)>;

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn mentions_flutter(request: &str) -> bool {
    let request = request.to_lowercase();
    request.contains("flutter") || request.contains("dart")
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(text)
}

fn describe_step(step: &Intent) -> String {
    let params = step.parameters.as_ref().map(|p| p.to_string()).unwrap_or_default();
    format!("{} - {} {}", step.kind_name(), step.name.as_deref().unwrap_or_default(), params).trim_end().to_string()
}

pub struct Wizard<R, W> {
    input: R,
    output: W,
    memory: Memory,
    session: SharedSession,
    router: Router,
    llm: Arc<LlmClient>,
    blueprints: BlueprintGenerator,
    default_location: PathBuf,
    debug: bool,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(input: R, output: W, memory: Memory, session: SharedSession, router: Router, llm: Arc<LlmClient>, default_location: PathBuf) -> Self {
        let blueprints = BlueprintGenerator::new(llm.clone());
        Self { input, output, memory, session, router, llm, blueprints, default_location, debug: false }
    }

    /// Print the blueprint before the preview.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    /// Print `question` and read one line. End of input reads as empty.
    fn prompt(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line).context("Failed to read input")?;
        Ok(line.trim().to_string())
    }

    /// Read lines until `DONE` or end of input.
    fn request(&mut self) -> Result<String> {
        self.say("\nDescribe the project you want (or paste a tree structure).")?;
        self.say("Type 'DONE' on a new line to finish:")?;
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 || line.trim().eq_ignore_ascii_case("done") {
                break;
            }
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(lines.join("\n").trim().to_string())
    }

    fn location(&mut self) -> Result<PathBuf> {
        let answer = self.prompt("Enter base location (absolute path): ")?;
        let location = match strip_quotes(&answer) {
            "" => self.default_location.clone(),
            path => crate::engine::expand_home(path),
        };
        std::fs::create_dir_all(&location).with_context(|| format!("Failed to create {}", location.display()))?;
        Ok(location)
    }

    /// Run the wizard once.
    ///
    /// # Errors
    /// Returns an error if the terminal, the memory store or the disk fails.
    /// Declined or invalid choices end the wizard without an error.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(last) = self.memory.last_project().await? {
            self.say(&format!("📂 Last project: {} at {}", last.name, last.path))?;
        }

        let base = self.location()?;
        let name = match self.prompt("Enter project name: ")? {
            name if name.is_empty() => "unnamed_project".to_string(),
            name => name,
        };
        let project_path = base.join(&name);

        self.say("\nChoose creation method:")?;
        self.say("1. Manual (predefined)")?;
        self.say("2. AI-generated (Ollama)")?;
        self.say("3. Similar to last project")?;
        self.say("4. Autonomous Task")?;
        self.say("5. Configure Profile")?;
        let method = self.prompt("Choice: ")?;

        let choice = match method.as_str() {
            "1" => self.manual(&name)?,
            "2" => {
                let request = self.request()?;
                self.generate(&request).await?
            }
            "3" => self.similar(&name).await?,
            "4" => self.autonomous().await?,
            "5" => {
                self.profile().await?;
                None
            }
            text if !text.is_empty() && !text.chars().all(|c| c.is_ascii_digit()) => {
                self.say("\n🤖 Processing as AI request...")?;
                self.generate(text).await?
            }
            _ => {
                self.say("❌ Invalid method")?;
                None
            }
        };

        match choice {
            Some((blueprint, project_type)) => self.create(&name, &project_path, &blueprint, &project_type).await,
            None => Ok(()),
        }
    }

    fn manual(&mut self, name: &str) -> Result<Choice> {
        self.say("\nWhat do you want to create?")?;
        for line in [
            "1. Single folder",
            "2. Custom multi-folder",
            "3. Flask project",
            "4. Flutter project",
            "5. React project",
            "6. Node.js project",
            "7. Web project",
            "8. Data science project",
        ] {
            self.say(line)?;
        }
        let choice = self.prompt("Choice: ")?;
        if choice == "2" {
            let folders = self.prompt("Enter folders (comma separated): ")?;
            let files = self.prompt("Enter files (comma separated): ")?;
            return Ok(Some((Blueprint::from_lists(&folders, &files), "custom".to_string())));
        }
        match MANUAL_CHOICES.iter().find(|(key, _)| *key == choice) {
            Some((_, template)) => Ok(Some((template.blueprint(name), template.as_str().to_string()))),
            None => {
                self.say("❌ Invalid choice")?;
                Ok(None)
            }
        }
    }

    async fn generate(&mut self, request: &str) -> Result<Choice> {
        let generated = self.blueprints.generate(request).await.and_then(Blueprint::validate);
        match generated {
            Ok(blueprint) => Ok(Some((blueprint, "ai_generated".to_string()))),
            Err(e) => {
                self.say(&format!("\n❌ AI Generation failed: {}", e))?;
                if !mentions_flutter(request) {
                    return Ok(None);
                }
                self.say("Attempting fallback generation for Flutter...")?;
                Ok(Some((flutter_fallback(), "flutter".to_string())))
            }
        }
    }

    async fn similar(&mut self, name: &str) -> Result<Choice> {
        let Some(last) = self.memory.last_project().await? else {
            self.say("❌ No previous project found in memory")?;
            return Ok(None);
        };
        self.say(&format!("\n📂 Creating project similar to: {}", last.name))?;
        let project_type = last.project_type.clone().unwrap_or_else(|| "unknown".to_string());
        let blueprint = last
            .blueprint()
            .filter(|b| !b.is_empty())
            .or_else(|| ProjectTemplate::for_project_type(&project_type).map(|t| t.blueprint(name)))
            .unwrap_or_default();
        Ok(Some((blueprint, project_type)))
    }

    async fn autonomous(&mut self) -> Result<Choice> {
        self.say("\n🤖 Autonomous Mode (Opt-in)")?;
        self.say("Describe your high-level goal (e.g., 'Set up a production Flask API with Docker and Auth')")?;
        let goal = self.request()?;

        self.say("🧠 Planning...")?;
        let plan = match planner::plan(&self.llm, &goal).await {
            Ok(plan) if !plan.is_empty() => plan,
            result => {
                if let Err(e) = result {
                    debug!("Planning failed: {}", e);
                }
                self.say("⚠️ Could not generate an autonomous plan. Falling back to blueprint generation.")?;
                return self.generate(&goal).await;
            }
        };

        self.say(&format!("\n📋 Generated Plan ({} steps):", plan.len()))?;
        for (i, step) in plan.iter().enumerate() {
            self.say(&format!("  {}. {}", i + 1, describe_step(step)))?;
        }
        let critique = critic::critique(&plan);
        self.say(&format!("\n🕵️ Critic Analysis: {}", critique.reason))?;
        self.say(&format!("📊 Predicted Effects: {}", critique.effects))?;

        let answer = self.prompt(&format!("\nExecute plan? (Risk: {}) (y/n): ", critique.risk))?;
        if !is_yes(&answer) {
            self.say("❌ Cancelled.")?;
            return Ok(None);
        }

        // The plan was confirmed as a whole; safety rules that deny a step still apply.
        for step in &plan {
            self.say(&format!("\n▶️ Executing: {}...", step.kind_name()))?;
            let step = Intent { confirmed: true, ..step.clone() };
            let outcome = self.router.run_steps(std::slice::from_ref(&step), true).await?;
            self.say(outcome.message())?;
        }
        self.say("\n✅ Autonomous task complete!")?;
        Ok(None)
    }

    async fn profile(&mut self) -> Result<()> {
        self.say("\n👤 Developer Profile Configuration")?;
        let stack = self.prompt("Preferred Stack (e.g., Flask, React): ")?;
        self.memory.set_preference("preferred_stack", &json!(stack), "profile").await?;
        self.say("✅ Profile updated!")
    }

    async fn create(&mut self, name: &str, project_path: &Path, blueprint: &Blueprint, project_type: &str) -> Result<()> {
        if self.debug {
            self.say("\n🔍 DEBUG: Blueprint structure:")?;
            self.say(&format!("Folders: {:?}", blueprint.folders))?;
            self.say(&format!("Files: {:?}", blueprint.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>()))?;
        }

        self.say("\n📁 PREVIEW:")?;
        for line in blueprint.preview(project_path) {
            self.say(&format!("  {}", line))?;
        }

        if !is_yes(&self.prompt("\nCreate project? (y/n): ")?) {
            self.say("❌ Project creation cancelled")?;
            return Ok(());
        }

        let report = scaffold::apply_blueprint(project_path, blueprint, self.router.undo_manager())?;
        let path_text = project_path.to_string_lossy().to_string();
        self.memory.remember_project(name, &path_text, project_type, Some(blueprint)).await?;
        self.session.lock().last_project = Some(ProjectRef { name: name.to_string(), path: path_text });
        info!("🏗️ Created {} ({} new entries)", project_path.display(), report.created().len());

        self.say(&format!("\n✅ Project created successfully at {}", project_path.display()))?;
        self.say(&format!("📝 Project saved to memory (type: {})", project_type))
    }
}
