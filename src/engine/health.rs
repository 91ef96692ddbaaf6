//! Project health scan.

use std::path::Path;

use serde::Serialize;

use super::deps;
use super::env::ProjectKind;

const ESSENTIALS: &[(&str, &str)] = &[
    ("README.md", "Documentation"),
    (".gitignore", "Version control ignores"),
    ("LICENSE", "Legal license"),
    ("requirements.txt", "Python dependencies"),
    ("package.json", "Node.js dependencies"),
    ("Dockerfile", "Containerization"),
    ("docker-compose.yml", "Multi-container setup"),
    (".env.example", "Environment template"),
];
const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec"];
const CI_FILES: &[&str] = &[".github/workflows", ".gitlab-ci.yml", "Jenkinsfile", ".travis.yml"];
const DOC_FILES: &[&str] = &["docs", "doc", "README.md", "CHANGELOG.md", "CONTRIBUTING.md"];
const MAX_RAW_SCORE: u32 = 60;

/// Result of a health scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub score: u32,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub good: Vec<String>,
    pub production_ready: bool,
}

/// Scan the project at `root`.
pub async fn scan(root: &Path) -> HealthReport {
    let mut report = HealthReport { production_ready: true, ..Default::default() };
    let mut raw = 0;
    let any_exists = |names: &[&str]| names.iter().any(|n| root.join(n).exists());

    for (file, desc) in ESSENTIALS {
        if root.join(file).exists() {
            report.good.push(format!("✅ {} present", desc));
            raw += 10;
        } else {
            report.issues.push(format!("❌ Missing {} ({})", desc, file));
            if matches!(*file, "README.md" | ".gitignore") {
                report.production_ready = false;
            }
        }
    }

    if any_exists(TEST_DIRS) {
        report.good.push("✅ Test directory present".to_string());
        raw += 15;
    } else {
        report.issues.push("❌ No test directory found".to_string());
        report.production_ready = false;
    }

    if any_exists(CI_FILES) {
        report.good.push("✅ CI/CD configuration present".to_string());
        raw += 10;
    } else {
        report.warnings.push("⚠️ No CI/CD configuration".to_string());
    }

    if ProjectKind::detect(root) == ProjectKind::Python {
        if any_exists(&["setup.py", "pyproject.toml"]) {
            report.good.push("✅ Python packaging configured".to_string());
            raw += 5;
        } else {
            report.warnings.push("⚠️ No Python packaging (setup.py/pyproject.toml)".to_string());
        }
    }

    if root.join(".env").exists() {
        report.good.push("✅ Environment variables configured".to_string());
        raw += 5;
    } else {
        report.warnings.push("⚠️ No .env file (environment variables)".to_string());
    }

    match deps::outdated(root).await {
        Ok(Some(output)) if !output.is_empty() => report.warnings.push("⚠️ Outdated dependencies detected".to_string()),
        Ok(Some(_)) => {
            report.good.push("✅ Dependencies up to date".to_string());
            raw += 5;
        }
        Ok(None) | Err(_) => report.warnings.push("⚠️ Could not check dependency status".to_string()),
    }

    if any_exists(DOC_FILES) {
        report.good.push("✅ Documentation present".to_string());
        raw += 10;
    } else {
        report.warnings.push("⚠️ Limited documentation".to_string());
    }

    report.score = (raw * 100 / MAX_RAW_SCORE).min(100);
    if report.score < 70 {
        report.production_ready = false;
    }
    report
}

impl HealthReport {
    pub fn format(&self) -> String {
        let mut out = format!("🏥 Project Health Report (Score: {}/100)\n\n", self.score);
        for (title, lines) in [("🚨 Critical Issues:", &self.issues), ("⚠️ Warnings:", &self.warnings), ("✅ Good Practices:", &self.good)] {
            if !lines.is_empty() {
                out.push_str(&format!("{}\n{}\n\n", title, lines.join("\n")));
            }
        }
        let readiness = if self.production_ready { "✅ Production Ready" } else { "❌ Not Production Ready" };
        out.push_str(&format!("📊 Overall: {}\n", readiness));
        out
    }

    pub fn quick_summary(&self) -> String {
        if !self.issues.is_empty() {
            format!("🚨 Health: {} issues, {} warnings (Score: {})", self.issues.len(), self.warnings.len(), self.score)
        } else if !self.warnings.is_empty() {
            format!("⚠️ Health: {} warnings (Score: {})", self.warnings.len(), self.score)
        } else {
            format!("✅ Health: All good (Score: {})", self.score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let report = scan(dir.path()).await;
        assert_eq!(report.score, 0);
        assert!(!report.production_ready);
        assert_eq!(report.issues.len(), ESSENTIALS.len() + 1);
        assert!(report.warnings.contains(&"⚠️ Could not check dependency status".to_string()));
        assert!(report.quick_summary().starts_with("🚨 Health: 9 issues"));
    }

    #[tokio::test]
    async fn test_documented_project_scores() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["README.md", ".gitignore", "LICENSE", "Dockerfile", ".env.example", ".env"] {
            std::fs::write(dir.path().join(file), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("tests")).unwrap();
        std::fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();

        let report = scan(dir.path()).await;
        // 5 essentials, tests, CI, .env and docs exceed the raw maximum
        assert_eq!(report.score, 100);
        assert!(report.production_ready);
        let text = report.format();
        assert!(text.starts_with("🏥 Project Health Report (Score: 100/100)"));
        assert!(text.contains("🚨 Critical Issues:\n❌ Missing Python dependencies (requirements.txt)"));
        assert!(text.ends_with("📊 Overall: ✅ Production Ready\n"));
    }
}
