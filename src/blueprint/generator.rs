//! Blueprint generation through the language model.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Blueprint, FileEntry};
use crate::error::Result;
use crate::llm::{LlmClient, json_slice};

const SYSTEM_PROMPT: &str = r##"You are an expert project scaffolding generator with deep knowledge of software architecture.

CRITICAL RULES:
- Output ONLY valid JSON
- Use relative paths only
- "folders" and "files" must be lists
- Support nested structures up to 5 levels
- Include necessary configuration files
- Add README.md with project description
- Include .gitignore when applicable
- For files, use format: {"path": "filename", "content": "file content"}
- DO NOT use single quotes, only double quotes for JSON
- Escape all backslashes and special characters

COMMON PATTERNS:
- Web: index.html, style.css, script.js
- Python: requirements.txt, main.py, setup.py
- Node: package.json, src/, public/
- Data: data/, notebooks/, scripts/
- Config: config/, .env.example

JSON format (use this exactly):
{
  "folders": ["src", "tests", "docs"],
  "files": [
    {"path": "README.md", "content": "# Project\n## Description"},
    {"path": "src/main.py", "content": "# Main application"},
    {"path": ".gitignore", "content": "*.pyc\n__pycache__/"}
  ]
}"##;

const TREE_CHARS: [char; 3] = ['├', '└', '│'];

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

/// Instruction matching the kind of project the user asked for.
fn task_instruction(request: &str) -> &'static str {
    if request.contains(TREE_CHARS) {
        return "Convert this tree structure to SIMPLE JSON format.\n\
                - Extract all folders and files\n\
                - Use simple paths\n\
                - For files, provide empty content or basic template\n\
                - Output must be valid JSON with double quotes only";
    }

    let lowered = request.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lowered.contains(w));
    if mentions(&["web", "website", "html", "css"]) {
        "Generate a simple web project blueprint with HTML, CSS, JS."
    } else if mentions(&["api", "rest", "backend"]) {
        "Generate a simple backend API project blueprint."
    } else if mentions(&["data", "analysis", "notebook"]) {
        "Generate a simple data analysis project blueprint."
    } else if mentions(&["flutter", "dart"]) {
        "Generate a simple Flutter/Dart project blueprint."
    } else {
        "Generate a simple project blueprint."
    }
}

fn build_prompt(request: &str) -> String {
    format!(
        "{}\n\nUSER REQUEST:\n{}\n\nADDITIONAL INSTRUCTIONS:\n{}\n\
         - Include essential configuration files\n\
         - Add sample/starter code in main files\n\
         - Ensure project is runnable/executable\n\
         - Add documentation where needed\n\nGenerate blueprint now:",
        SYSTEM_PROMPT,
        request,
        task_instruction(request)
    )
}

/// Generates blueprints from natural-language requests or pasted trees.
#[derive(Clone)]
pub struct BlueprintGenerator {
    llm: Arc<LlmClient>,
}

impl BlueprintGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Ask the model for a blueprint.
    ///
    /// # Errors
    /// Returns `ValError::Llm` if the model cannot be reached. A reachable
    /// model always yields some blueprint, see [`parse_response`].
    pub async fn generate(&self, request: &str) -> Result<Blueprint> {
        let started = Instant::now();
        let response = self.llm.complete(&build_prompt(request)).await?;
        info!("🤖 AI response time: {:.2} seconds", started.elapsed().as_secs_f32());
        Ok(parse_response(&response))
    }
}

fn without_control_chars(text: &str) -> String {
    text.chars().filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t')).collect()
}

fn parse_blueprint(text: &str) -> Option<Blueprint> {
    let value: Value = serde_json::from_str(text).ok()?;
    Blueprint::from_value(value).ok()
}

/// Turn a raw model answer into a blueprint.
///
/// Tries a fenced code block, then the outermost braces, then a repair pass,
/// and finally scans the text line by line for paths.
pub fn parse_response(response: &str) -> Blueprint {
    let candidate = match CODE_FENCE.captures(response).and_then(|c| c.get(1)) {
        Some(fenced) => fenced.as_str(),
        None => json_slice(response).unwrap_or(response),
    };
    let candidate = without_control_chars(candidate);

    if let Some(blueprint) = parse_blueprint(&candidate) {
        return blueprint;
    }

    debug!("Blueprint JSON invalid, attempting repair");
    let repaired: String = candidate
        .replace('\\', "\\\\")
        .chars()
        .filter(|c| matches!(c, '\n' | '\r' | '\t') || (' '..='~').contains(c))
        .collect();
    if let Some(blueprint) = json_slice(&repaired).and_then(parse_blueprint) {
        return blueprint;
    }

    warn!("Falling back to line-based structure extraction");
    extract_simple_structure(response)
}

/// Recover folders and files from a tree drawing or a path listing.
fn extract_simple_structure(response: &str) -> Blueprint {
    let mut folders: Vec<String> = Vec::new();
    let mut files: Vec<FileEntry> = Vec::new();

    for line in response.lines().map(str::trim) {
        if !line.contains('/') && !line.contains(TREE_CHARS) {
            continue;
        }
        let clean = line.replace("├──", "").replace("└──", "").replace('│', "");
        let clean = clean.trim();
        if clean.is_empty() {
            continue;
        }

        if clean.contains('/') {
            let last = clean.rsplit('/').next().unwrap_or_default();
            if last.is_empty() || !last.contains('.') {
                let folder = clean.trim_end_matches('/').to_string();
                if !folder.is_empty() && !folders.contains(&folder) {
                    folders.push(folder);
                }
            } else if !files.iter().any(|f| f.path == clean) {
                files.push(FileEntry::new(clean, ""));
            }
        } else if !clean.contains('.') && clean != "flutter_app" && !folders.iter().any(|f| f == clean) {
            folders.push(clean.to_string());
        }
    }

    if folders.is_empty() && files.is_empty() {
        return flutter_fallback();
    }
    if files.is_empty() {
        files.push(FileEntry::new("README.md", "# Generated App"));
    }
    Blueprint { folders, files }
}

/// Minimal Flutter skeleton used when nothing usable came back.
pub fn flutter_fallback() -> Blueprint {
    Blueprint {
        folders: vec!["lib".to_string(), "assets".to_string()],
        files: vec![FileEntry::new("README.md", "# Flutter App"), FileEntry::new("pubspec.yaml", "name: flutter_app")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_by_keyword() {
        assert!(task_instruction("a REST backend for todos").contains("backend API"));
        assert!(task_instruction("my portfolio website").contains("web project"));
        assert!(task_instruction("app/\n├── lib").starts_with("Convert this tree"));
        assert_eq!(task_instruction("something"), "Generate a simple project blueprint.");
    }

    #[test]
    fn test_parses_fenced_json() {
        let response = "Here you go:\n```json\n{\"folders\": [\"src\"], \"files\": [\"src/main.py:print(1)\"]}\n```\nEnjoy!";
        let blueprint = parse_response(response);
        assert_eq!(blueprint.folders, vec!["src"]);
        assert_eq!(blueprint.files, vec![FileEntry::new("src/main.py", "print(1)")]);
    }

    #[test]
    fn test_parses_braced_json_with_chatter() {
        let blueprint = parse_response("Sure! {\"folders\": [\"docs\"], \"files\": []} Let me know.");
        assert_eq!(blueprint.folders, vec!["docs"]);
    }

    #[test]
    fn test_repairs_unescaped_backslashes() {
        let blueprint = parse_response(r#"{"folders": ["src\utils"], "files": []}"#);
        assert_eq!(blueprint.folders, vec![r"src\utils"]);
    }

    #[test]
    fn test_tree_fallback() {
        let response = "shop/\n├── src/\n│   ├── app/main.py\n└── docs/";
        let blueprint = parse_response(response);
        assert!(blueprint.folders.contains(&"shop".to_string()));
        assert!(blueprint.folders.contains(&"docs".to_string()));
        assert_eq!(blueprint.files, vec![FileEntry::new("app/main.py", "")]);
    }

    #[test]
    fn test_folders_only_gets_readme() {
        let blueprint = parse_response("lib/\nassets/images/");
        assert_eq!(blueprint.folders, vec!["lib", "assets/images"]);
        assert_eq!(blueprint.files, vec![FileEntry::new("README.md", "# Generated App")]);
    }

    #[test]
    fn test_nothing_usable_gives_flutter_skeleton() {
        assert_eq!(parse_response("I cannot help with that."), flutter_fallback());
    }

    #[tokio::test]
    async fn test_generate_uses_model_answer() {
        let generator = BlueprintGenerator::new(Arc::new(LlmClient::scripted(&["{\"folders\": [\"api\"], \"files\": []}"])));
        assert_eq!(generator.generate("rest api").await.unwrap().folders, vec!["api"]);
        assert!(generator.generate("again").await.is_err());
    }
}
