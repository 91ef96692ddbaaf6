//! Turn a high-level goal into a list of intents with the language model.

use serde_json::Value;
use tracing::info;

use crate::error::{Result, ValError};
use crate::intent::Intent;
use crate::llm::{LlmClient, json_slice};

const MAX_STEPS: usize = 12;

fn build_prompt(goal: &str) -> String {
    format!(
        r#"You are VAL, an autonomous developer agent. Break the goal into concrete steps.

Goal: {goal}

Use only these intents: create_flask_project, create_django_project, create_react_project, create_vue_project,
create_svelte_project, create_node_project, create_flutter_project, create_web_project, create_data_project,
create_project, create_folder, create_file, install_dependencies, add_docker, git_init, git_commit, git_branch,
env_create, deps_add, open_app, set_goal, check_health.

Answer with JSON only:
{{"plan": [{{"intent": "create_flask_project", "name": "api"}}, {{"intent": "add_docker"}}]}}"#
    )
}

/// Ask the model for a plan.
///
/// # Errors
/// Returns `ValError::Llm` if the model is unreachable or the answer holds no plan.
pub async fn plan(llm: &LlmClient, goal: &str) -> Result<Vec<Intent>> {
    let response = llm.complete(&build_prompt(goal)).await?;
    let json = json_slice(&response).ok_or_else(|| ValError::Llm("no JSON object in plan".to_string()))?;
    let value: Value = serde_json::from_str(json)?;

    let steps = match value.get("plan") {
        Some(Value::Array(steps)) => steps,
        _ => return Err(ValError::Llm("answer has no plan".to_string())),
    };
    let plan: Vec<Intent> = steps
        .iter()
        .take(MAX_STEPS)
        .map(|step| match step {
            Value::String(name) => Intent::from_step(name),
            other => Intent::from_value(other.clone()).with_source("planner"),
        })
        .filter(|intent| intent.intent.is_some())
        .collect();

    info!("📋 Planned {} steps for: {}", plan.len(), goal);
    Ok(plan)
}
