//! Plan review before autonomous execution.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::simulator;
use crate::intent::Intent;

/// Risk of a plan or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        })
    }
}

static RISK_PATTERNS: LazyLock<Vec<(Risk, Regex)>> = LazyLock::new(|| {
    let patterns = [
        (Risk::High, r"delete.*all"),
        (Risk::High, r"drop.*database"),
        (Risk::High, r"format.*drive"),
        (Risk::High, r"rm.*-rf.*/"),
        (Risk::High, r"sudo.*rm"),
        (Risk::High, r"overwrite.*system"),
        (Risk::High, r"force_delete|delete_folder"),
        (Risk::Medium, r"install.*unknown"),
        (Risk::Medium, r"download.*untrusted"),
        (Risk::Medium, r"run.*script"),
        (Risk::Medium, r"chmod.*777"),
        (Risk::Medium, r"pip install.*--force"),
        (Risk::Medium, r"git_push|git_undo"),
        (Risk::Low, r"create.*file"),
        (Risk::Low, r"mkdir"),
        (Risk::Low, r"git.*commit"),
        (Risk::Low, r"echo"),
    ];
    patterns
        .into_iter()
        .map(|(risk, pattern)| (risk, Regex::new(&format!("(?i){}", pattern)).expect("valid risk pattern")))
        .collect()
});

/// A matched risk pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub risk: Risk,
    pub pattern: String,
    pub step: String,
}

/// The critic's verdict on a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Critique {
    pub risk: Risk,
    pub reason: String,
    pub effects: String,
    pub recommendations: Vec<String>,
    pub findings: Vec<Finding>,
}

fn step_text(step: &Intent) -> String {
    let params = step.parameters.as_ref().map(|p| p.to_string()).unwrap_or_default();
    format!(
        "{} {} {} {}",
        step.kind_name(),
        step.name.as_deref().unwrap_or_default(),
        step.path.as_deref().unwrap_or_default(),
        params
    )
    .to_lowercase()
}

/// Review a plan for risky operations.
pub fn critique(plan: &[Intent]) -> Critique {
    if plan.is_empty() {
        return Critique {
            risk: Risk::Low,
            reason: "Empty plan - no actions to evaluate".to_string(),
            effects: "No actions planned".to_string(),
            recommendations: vec!["Add specific actions to the plan".to_string()],
            findings: Vec::new(),
        };
    }

    let findings: Vec<Finding> = plan
        .iter()
        .flat_map(|step| {
            let text = step_text(step);
            RISK_PATTERNS
                .iter()
                .filter(|(_, re)| re.is_match(&text))
                .map(|(risk, re)| Finding { risk: *risk, pattern: re.as_str().to_string(), step: text.clone() })
                .collect::<Vec<_>>()
        })
        .collect();

    let simulation = simulator::simulate(plan);
    let risk = findings.iter().map(|f| f.risk).max().unwrap_or(Risk::Low).max(simulation.risk);

    let (reason, recommendations): (&str, &[&str]) = match risk {
        Risk::High => (
            "Plan contains high-risk operations that could cause data loss or system damage",
            &[
                "Consider breaking down high-risk operations into smaller, reversible steps",
                "Create backups before executing destructive operations",
                "Test operations in a safe environment first",
            ],
        ),
        Risk::Medium => (
            "Plan contains potentially risky operations that should be reviewed",
            &[
                "Review operations with unknown sources",
                "Verify download URLs and package sources",
                "Consider using virtual environments for installations",
            ],
        ),
        Risk::Low => ("Plan appears safe with standard operations", &[]),
    };

    Critique {
        risk,
        reason: reason.to_string(),
        effects: simulation.summary,
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentKind;

    #[test]
    fn test_empty_plan() {
        let critique = critique(&[]);
        assert_eq!(critique.risk, Risk::Low);
        assert_eq!(critique.effects, "No actions planned");
    }

    #[test]
    fn test_safe_plan() {
        let plan = [Intent::of(IntentKind::CreateReactProject).with_name("web"), Intent::of(IntentKind::GitCommit)];
        let critique = critique(&plan);
        assert_eq!(critique.risk, Risk::Low);
        assert!(critique.recommendations.is_empty());
        assert_eq!(critique.effects, "Creates 2, Modifies 1, Deletes 0");
    }

    #[test]
    fn test_destructive_plan() {
        let plan = [Intent { path: Some("src".into()), ..Intent::of(IntentKind::DeleteFolder) }];
        let critique = critique(&plan);
        assert_eq!(critique.risk, Risk::High);
        assert_eq!(critique.recommendations.len(), 3);
        assert!(critique.findings.iter().any(|f| f.risk == Risk::High));
    }

    #[test]
    fn test_push_is_medium() {
        let critique = critique(&[Intent::of(IntentKind::GitPush)]);
        assert_eq!(critique.risk, Risk::Medium);
    }
}
