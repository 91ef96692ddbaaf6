//! Memory-aware extraction prompt.

use crate::error::Result;
use crate::memory::Memory;

const SUPPORTED_INTENTS: &str = "\
- create_flutter_project, create_flask_project, create_django_project, create_react_project,
  create_vue_project, create_svelte_project, create_node_project, create_data_project, create_web_project
- create_folder, create_file, delete_file, delete_folder
- open_project, run_project, install_dependencies, add_docker
- undo, undo_multiple, list_undo, stop, help, status
- remember (store information), recall (retrieve information), forget (remove information)
- remember_workflow (store automation rule), repeat_last_workflow (repeat last automated workflow)
- pipeline (multi-step command), execute_pipeline (run stored macro)
- list_projects, open_last_project, similar_to_last
- explain_file, find_auth, show_routes, find_calls, check_health, quick_health
- start_workflow, stop_workflow, replay_workflow, list_workflows, delete_workflow
- autonomous_mode (plan and execute complex task)
- open_app (open external application), set_voice_mode (whisper/normal)
- set_goal (add a new goal), list_goals (show active goals), complete_goal
- git_init, git_commit, git_branch, git_push, git_undo, git_status
- env_create, env_load, env_switch
- deps_list, deps_outdated, deps_add, deps_remove, deps_audit";

const RESPONSE_FORMAT: &str = r#"{
  "intent": "intent_name",
  "name": "project_name",
  "location": "path/location",
  "action": "create_folder/create_file/etc",
  "path": "full/path",
  "parameters": {"key": "value"},
  "plan": [{"intent": "step1"}, {"intent": "step2"}],
  "confidence": 0.95,
  "requires_confirmation": false
}"#;

const EXAMPLES: &str = r#""create a React app called myapp" -> {"intent": "create_react_project", "name": "myapp"}
"delete the config folder" -> {"intent": "delete_folder", "path": "./config", "requires_confirmation": true}
"run the project" -> {"intent": "run_project"}
"remember that I like blue themes" -> {"intent": "remember", "parameters": {"key": "theme_preference", "value": "blue"}}
"remember: after creating Flask, add Docker and open VS Code" -> {"intent": "remember_workflow", "trigger": {"intent": "create_flask_project", "tech": "flask"}, "actions": ["add_docker", "open_vscode"]}
"do the usual setup" -> {"intent": "repeat_last_workflow"}
"Create React app, install deps, run server" -> {"intent": "pipeline", "steps": ["create_react_project", "install_dependencies", "run_project"]}
"Do full React setup" -> {"intent": "execute_pipeline", "name": "react_full_setup"}
"Commit with message 'WIP'" -> {"intent": "git_commit", "message": "WIP"}
"Create branch auth" -> {"intent": "git_branch", "name": "auth"}
"Push to GitHub" -> {"intent": "git_push", "remote": "origin"}
"Switch to dev config" -> {"intent": "env_switch", "config": "dev"}
"Add JWT auth dependency" -> {"intent": "deps_add", "name": "pyjwt"}
"Which files call the login function?" -> {"intent": "find_calls", "function": "login"}
"Undo the last 3 operations" -> {"intent": "undo_multiple", "count": 3}
"Set up a production Flask API" -> {"intent": "autonomous_mode", "plan": [{"intent": "create_flask_project", "name": "api"}, {"intent": "add_docker"}, {"intent": "deps_add", "name": "pyjwt"}]}
"Open VS Code" -> {"intent": "open_app", "name": "vscode"}
"Set a goal to keep dependencies updated" -> {"intent": "set_goal", "description": "Keep dependencies updated"}"#;

/// Last project and the two most recent actions.
async fn memory_context(memory: &Memory) -> Result<String> {
    let mut lines = Vec::new();
    if let Some(project) = memory.last_project().await? {
        lines.push(format!("Last project: {} at {}", project.name, project.path));
    }

    let events = memory.recent_events(3).await?;
    let actions: Vec<String> = events
        .iter()
        .filter_map(|e| e.intent_name().map(|name| format!("- {}: {}", name, e.result.as_deref().unwrap_or("-"))))
        .take(2)
        .collect();
    if !actions.is_empty() {
        lines.push("Recent actions:".to_string());
        lines.extend(actions);
    }
    Ok(lines.join("\n"))
}

async fn user_preferences(memory: &Memory) -> Result<String> {
    let preferences = memory.recent_preferences(5).await?;
    if preferences.is_empty() {
        return Ok("No preferences stored yet".to_string());
    }
    Ok(preferences.iter().map(|(k, v)| format!("{}: {}", k, v)).collect::<Vec<_>>().join("\n"))
}

async fn user_profile(memory: &Memory) -> Result<String> {
    let profile = memory.profile().await?;
    if profile.is_empty() {
        return Ok("Standard User".to_string());
    }
    Ok(profile.iter().map(|(k, v)| format!("- {}: {}", k, v)).collect::<Vec<_>>().join("\n"))
}

/// Build the full extraction prompt for `text`.
///
/// # Errors
/// Returns an error if memory cannot be read.
pub async fn build(memory: &Memory, text: &str) -> Result<String> {
    Ok(format!(
        "You are VAL, a local AI assistant with memory and cognitive capabilities.\n\
         You remember past interactions, projects, and user preferences.\n\n\
         MEMORY CONTEXT:\n{}\n\nUSER PREFERENCES:\n{}\n\nUSER PROFILE:\n{}\n\n\
         EXTRACT intent as JSON only.\n\nSUPPORTED INTENTS:\n{}\n\nRESPONSE FORMAT:\n{}\n\nEXAMPLES:\n{}\n\n\
         User command: {}\n\nExtracted intent (JSON only, use autonomous_mode for complex tasks):",
        memory_context(memory).await?,
        user_preferences(memory).await?,
        user_profile(memory).await?,
        SUPPORTED_INTENTS,
        RESPONSE_FORMAT,
        EXAMPLES,
        text
    ))
}
