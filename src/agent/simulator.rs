//! Dry run of a plan: what it would create, modify and delete.

use serde::Serialize;

use super::critic::Risk;
use crate::intent::{Intent, IntentKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub creates: Vec<String>,
    pub modifies: Vec<String>,
    pub deletes: Vec<String>,
    pub risk: Risk,
    pub summary: String,
}

/// Predict the effects of `plan` without running anything.
pub fn simulate(plan: &[Intent]) -> Simulation {
    let mut creates = Vec::new();
    let mut modifies = Vec::new();
    let mut deletes = Vec::new();

    for step in plan {
        let path = || step.arg("path").unwrap_or_else(|| "unknown".to_string());
        match step.intent.as_ref() {
            Some(IntentKind::CreateFile) => creates.push(path()),
            Some(IntentKind::CreateFolder) => creates.push(format!("{}/", path())),
            Some(IntentKind::DeleteFile | IntentKind::DeleteFolder) => deletes.push(path()),
            Some(IntentKind::AddDocker) => creates.push("Dockerfile".to_string()),
            Some(IntentKind::EnvCreate) => creates.push(".env".to_string()),
            Some(IntentKind::DepsAdd | IntentKind::DepsRemove | IntentKind::InstallDependencies) => {
                modifies.push("dependencies".to_string());
                creates.push("lock files".to_string());
            }
            Some(kind) if kind.tech().is_some() || *kind == IntentKind::CreateProject || *kind == IntentKind::SimilarToLast => {
                creates.push(format!("Project: {}", step.arg("name").unwrap_or_else(|| "new_project".to_string())));
                creates.push("Config files".to_string());
            }
            Some(kind) if kind.as_str().starts_with("git_") && *kind != IntentKind::GitStatus => {
                modifies.push("Git History".to_string());
                if *kind == IntentKind::GitUndo {
                    deletes.push("Recent Commits".to_string());
                }
            }
            _ => {}
        }
    }

    let risk = if !deletes.is_empty() {
        Risk::High
    } else if modifies.len() > 5 {
        Risk::Medium
    } else {
        Risk::Low
    };
    let summary = format!("Creates {}, Modifies {}, Deletes {}", creates.len(), modifies.len(), deletes.len());
    Simulation { creates, modifies, deletes, risk, summary }
}
