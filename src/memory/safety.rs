use serde::{Deserialize, Serialize};

use super::{Memory, now};
use crate::error::Result;
use crate::intent::Intent;

/// System locations that are never touched.
const PROTECTED_PATHS: &[&str] = &["/", "C:/Windows", "C:/Program Files", "C:/Program Files (x86)", "/System", "/Library", "/usr", "/bin", "/etc"];

/// Patterns that need confirmation wherever they appear.
const DANGEROUS_ACTIONS: &[(&str, &str)] = &[
    ("delete", "Deletes files or folders"),
    ("format", "Formats or wipes data"),
    ("rm -rf", "Recursive forced removal"),
    ("force", "Forced operation"),
];

/// Intents that only read state.
const READ_ONLY_INTENTS: &[&str] = &["list_projects", "status", "help", "explain_file", "check_health", "open_app"];

/// What to do with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyAction {
    Allow,
    Deny,
    Confirm,
}

impl SafetyAction {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "deny" => SafetyAction::Deny,
            "confirm" => SafetyAction::Confirm,
            _ => SafetyAction::Allow,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SafetyAction::Allow => "allow",
            SafetyAction::Deny => "deny",
            SafetyAction::Confirm => "confirm",
        }
    }
}

/// Risk classification of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Normal,
    Dangerous,
    Critical,
}

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub action: SafetyAction,
    pub level: RiskLevel,
    pub reason: String,
}

impl SafetyVerdict {
    fn allow(level: RiskLevel) -> Self {
        Self { safe: true, action: SafetyAction::Allow, level, reason: String::new() }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SafetyRule {
    pattern: String,
    action: String,
    reason: Option<String>,
}

fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

/// Whether `path` is `protected` or lives below it. The filesystem root only
/// matches itself.
fn is_under(path: &str, protected: &str) -> bool {
    let path = normalize_path(path);
    let protected = normalize_path(protected);
    if protected == "/" {
        return path == "/";
    }
    let path = path.trim_end_matches('/');
    let protected = protected.trim_end_matches('/');
    path == protected || path.starts_with(&format!("{}/", protected))
}

impl Memory {
    /// Insert the built-in protected paths and dangerous actions if missing.
    pub(super) async fn seed_safety_rules(&self) -> Result<()> {
        for path in PROTECTED_PATHS {
            sqlx::query("INSERT OR IGNORE INTO safety_rules (rule_type, pattern, action, reason, created_at) VALUES ('protected_path', ?, 'deny', 'System directory', ?)")
                .bind(path)
                .bind(now())
                .execute(&self.pool)
                .await?;
        }
        for (pattern, reason) in DANGEROUS_ACTIONS {
            sqlx::query("INSERT OR IGNORE INTO safety_rules (rule_type, pattern, action, reason, created_at) VALUES ('dangerous_action', ?, 'confirm', ?, ?)")
                .bind(pattern)
                .bind(reason)
                .bind(now())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn rules(&self, rule_type: &str) -> Result<Vec<SafetyRule>> {
        let rules = sqlx::query_as::<_, SafetyRule>("SELECT pattern, action, reason FROM safety_rules WHERE rule_type = ? ORDER BY id")
            .bind(rule_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }

    /// Classify an intent before it runs.
    ///
    /// # Arguments
    /// * `intent` - The intent about to run; its serialized form is matched too
    /// * `action` - Free-form description of the concrete action
    /// * `path` - Filesystem target, checked against protected locations
    pub async fn check_safety(&self, intent: &Intent, action: &str, path: Option<&str>) -> Result<SafetyVerdict> {
        let level = if READ_ONLY_INTENTS.contains(&intent.kind_name()) { RiskLevel::Safe } else { RiskLevel::Normal };

        if let Some(path) = path {
            for rule in self.rules("protected_path").await? {
                if is_under(path, &rule.pattern) {
                    return Ok(SafetyVerdict {
                        safe: false,
                        action: SafetyAction::Deny,
                        level: RiskLevel::Critical,
                        reason: format!("Protected system path: {}", rule.pattern),
                    });
                }
            }
        }

        let action = action.to_lowercase();
        let intent_text = serde_json::to_string(intent)?.to_lowercase();

        for rule in self.rules("dangerous_action").await? {
            let pattern = rule.pattern.to_lowercase();
            if action.contains(&pattern) || intent_text.contains(&pattern) {
                let decided = SafetyAction::parse(&rule.action);
                let level = if pattern.contains("reset") || pattern.contains("force") { RiskLevel::Critical } else { RiskLevel::Dangerous };
                return Ok(SafetyVerdict {
                    safe: decided == SafetyAction::Allow,
                    action: decided,
                    level,
                    reason: rule.reason.unwrap_or_default(),
                });
            }
        }

        Ok(SafetyVerdict::allow(level))
    }

    /// First rule of `rule_type` whose pattern occurs in `text`.
    pub async fn check_rule(&self, rule_type: &str, text: &str) -> Result<Option<SafetyVerdict>> {
        let text = text.to_lowercase();
        for rule in self.rules(rule_type).await? {
            let pattern = rule.pattern.to_lowercase();
            if text.contains(&pattern) {
                let decided = SafetyAction::parse(&rule.action);
                let level = if pattern.contains("reset") || pattern.contains("force") { RiskLevel::Critical } else { RiskLevel::Dangerous };
                return Ok(Some(SafetyVerdict {
                    safe: decided == SafetyAction::Allow,
                    action: decided,
                    level,
                    reason: rule.reason.unwrap_or_default(),
                }));
            }
        }
        Ok(None)
    }

    /// Add a rule or update the action and reason of an existing one.
    pub async fn add_safety_rule(&self, rule_type: &str, pattern: &str, action: SafetyAction, reason: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO safety_rules (rule_type, pattern, action, reason, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(rule_type, pattern) DO UPDATE SET action = excluded.action, reason = excluded.reason",
        )
        .bind(rule_type)
        .bind(pattern)
        .bind(action.as_str())
        .bind(reason)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
