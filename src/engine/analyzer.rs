//! Lightweight code navigation: file summaries, auth handlers, routes and call sites.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

const CODE_EXTENSIONS: &[&str] = &["py", "js", "ts", "jsx", "tsx"];
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".venv", "venv", "__pycache__", "build", "dist", ".dart_tool"];
const AUTH_KEYWORDS: &[&str] = &["auth", "login", "authenticate", "token", "jwt", "session", "password"];
const MAX_CALLS: usize = 20;

static PY_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*class\s+(\w+)").unwrap());
static PY_DEF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(\w+)").unwrap());
static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)").unwrap());
static PY_FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+([\w.]+)\s+import\s+([\w., ]+)").unwrap());
static JS_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:function|const|let|var)\s+(\w+)\s*[=:]?\s*(?:function|\([^)]*\)\s*=>)").unwrap());
static JS_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"class\s+(\w+)").unwrap());
static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"import\s+.*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());
static FLASK_ROUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"@\w+\.route\(['"]([^'"]+)['"]"#).unwrap());
static DJANGO_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bpath\(['"]([^'"]*)['"]"#).unwrap());
static EXPRESS_ROUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\b(?:app|router)\.(get|post|put|delete|patch)\(['"]([^'"]+)['"]"#).unwrap());
static REACT_ROUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<Route[^>]*path=['"]([^'"]+)['"]"#).unwrap());

fn captures(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text).filter_map(|c| c.get(1)).map(|m| m.as_str().to_string()).collect()
}

/// `a, b, c` with a trailing ellipsis past `limit`.
fn joined(items: &[String], limit: usize) -> String {
    let shown = items.iter().take(limit).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > limit { format!("{}...", shown) } else { shown }
}

fn purpose(filename: &str) -> Option<&'static str> {
    let name = filename.to_lowercase();
    if name.contains("app") || name.contains("main") {
        Some("Main application entry point")
    } else if name.contains("model") {
        Some("Data models/ORM")
    } else if name.contains("route") || name.contains("api") {
        Some("API endpoints/routes")
    } else if name.contains("test") {
        Some("Unit/integration tests")
    } else {
        None
    }
}

fn explain_python(content: &str, filename: &str) -> String {
    let classes = captures(&PY_CLASS, content);
    let functions = captures(&PY_DEF, content);
    let mut imports: Vec<String> = PY_IMPORT
        .captures_iter(content)
        .flat_map(|c| c[1].split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())
        .collect();
    for c in PY_FROM.captures_iter(content) {
        imports.extend(c[2].split(',').map(str::trim).filter(|s| !s.is_empty()).map(|name| format!("{}.{}", &c[1], name)));
    }

    let mut lines = vec![format!("📄 {}", filename)];
    if !classes.is_empty() {
        lines.push(format!("Classes: {}", classes.join(", ")));
    }
    if !functions.is_empty() {
        lines.push(format!("Functions: {}", joined(&functions, 10)));
    }
    if !imports.is_empty() {
        lines.push(format!("Imports: {}", joined(&imports, 5)));
    }
    if let Some(purpose) = purpose(filename) {
        lines.push(format!("Purpose: {}", purpose));
    }
    lines.join("\n")
}

fn explain_js(content: &str, filename: &str) -> String {
    let classes = captures(&JS_CLASS, content);
    let functions = captures(&JS_FUNCTION, content);
    let imports = captures(&JS_IMPORT, content);

    let mut lines = vec![format!("📄 {}", filename)];
    if !classes.is_empty() {
        lines.push(format!("Classes: {}", classes.join(", ")));
    }
    if !functions.is_empty() {
        lines.push(format!("Functions/Components: {}", joined(&functions, 10)));
    }
    if !imports.is_empty() {
        lines.push(format!("Imports: {}", joined(&imports, 5)));
    }
    lines.join("\n")
}

fn explain_generic(content: &str, filename: &str) -> String {
    let head: String = content.chars().take(200).collect();
    let mut lines = vec![format!("📄 {}", filename), format!("Lines: {}", content.lines().count())];
    if head.contains("# ") {
        lines.push("Type: Documentation/Markdown".to_string());
    } else if head.contains("function") || head.contains("def ") {
        lines.push("Type: Code file".to_string());
    } else if head.contains('{') && head.contains('}') {
        lines.push("Type: Configuration (JSON/YAML)".to_string());
    }
    lines.join("\n")
}

/// Code analysis rooted at a project directory.
pub struct CodeAnalyzer {
    root: PathBuf,
}

impl CodeAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Source files below the root, skipping dependency and build folders.
    fn code_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.depth() > 0 && e.file_name().to_str().is_some_and(|n| SKIP_DIRS.contains(&n))))
            .flatten()
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|ext| ext.to_str()).is_some_and(|ext| CODE_EXTENSIONS.contains(&ext)))
            .map(|e| e.into_path())
            .collect()
    }

    fn file_name(path: &Path) -> String {
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Summarise a file relative to the root.
    pub fn explain_file(&self, file: &str) -> String {
        let path = self.root.join(file);
        if !path.exists() {
            return format!("❌ File not found: {}", file);
        }
        let content = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return format!("❌ Error reading file: {}", e),
        };
        let filename = Self::file_name(&path);
        match path.extension().map(|e| e.to_string_lossy().to_lowercase()).as_deref() {
            Some("py") => explain_python(&content, &filename),
            Some("js" | "ts" | "jsx" | "tsx") => explain_js(&content, &filename),
            _ => explain_generic(&content, &filename),
        }
    }

    pub fn find_auth_handlers(&self) -> String {
        let results: Vec<String> = self
            .code_files()
            .iter()
            .filter_map(|path| {
                let content = std::fs::read_to_string(path).ok()?.to_lowercase();
                let matches: Vec<&str> = AUTH_KEYWORDS.iter().copied().filter(|k| content.contains(k)).collect();
                (!matches.is_empty()).then(|| format!("{}: {}", Self::file_name(path), matches.join(", ")))
            })
            .collect();

        if results.is_empty() {
            return "🔐 No obvious auth handlers found".to_string();
        }
        format!("🔐 Auth handlers found:\n{}", results.join("\n"))
    }

    pub fn show_api_routes(&self) -> String {
        let mut routes = Vec::new();
        for path in self.code_files() {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let filename = Self::file_name(&path);
            if path.extension().is_some_and(|e| e == "py") {
                routes.extend(captures(&FLASK_ROUTE, &content).into_iter().map(|r| format!("Flask: {} ({})", r, filename)));
                routes.extend(captures(&DJANGO_PATH, &content).into_iter().map(|r| format!("Django: {} ({})", r, filename)));
            } else {
                for c in EXPRESS_ROUTE.captures_iter(&content) {
                    routes.push(format!("Express {}: {} ({})", c[1].to_uppercase(), &c[2], filename));
                }
                routes.extend(captures(&REACT_ROUTE, &content).into_iter().map(|r| format!("React Router: {} ({})", r, filename)));
            }
        }

        if routes.is_empty() {
            return "🛣️ No API routes found".to_string();
        }
        format!("🛣️ API Routes:\n{}", routes.join("\n"))
    }

    /// Lines mentioning `function` outside its definition, first twenty.
    pub fn find_function_calls(&self, function: &str) -> String {
        let mut results = Vec::new();
        for path in self.code_files() {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            if !content.contains(function) {
                continue;
            }
            for (number, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                let is_definition = trimmed.starts_with("def ") || trimmed.starts_with("async def ") || trimmed.starts_with("function ");
                if trimmed.contains(function) && !is_definition {
                    results.push(format!("{}:{}: {}", Self::file_name(&path), number + 1, trimmed));
                }
            }
        }

        if results.is_empty() {
            return format!("📞 Function '{}' not found in calls", function);
        }
        let more = if results.len() > MAX_CALLS { "\n..." } else { "" };
        results.truncate(MAX_CALLS);
        format!("📞 Function '{}' called in:\n{}{}", function, results.join("\n"), more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("app.py"),
            "import os, sys\nfrom flask import Flask, jsonify\n\napp = Flask(__name__)\n\nclass User:\n    pass\n\n@app.route('/login')\ndef login():\n    return jsonify(token='x')\n\n@bp.route(\"/users\")\ndef users():\n    login()\n",
        )
        .unwrap();
        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::write(
            root.join("src/server.js"),
            "import express from 'express';\nconst app = express();\napp.get('/health', (req, res) => res.send('ok'));\nconst start = () => app.listen(3000);\n",
        )
        .unwrap();
        std::fs::create_dir(root.join("node_modules")).unwrap();
        std::fs::write(root.join("node_modules/dep.js"), "app.get('/ignored', f)").unwrap();
        std::fs::write(root.join("README.md"), "# Demo\nA demo").unwrap();
        dir
    }

    #[test]
    fn test_explain_python() {
        let dir = project();
        let text = CodeAnalyzer::new(dir.path()).explain_file("app.py");
        assert!(text.starts_with("📄 app.py"));
        assert!(text.contains("Classes: User"));
        assert!(text.contains("Functions: login, users"));
        assert!(text.contains("Imports: os, sys, flask.Flask, flask.jsonify"));
        assert!(text.contains("Purpose: Main application entry point"));
    }

    #[test]
    fn test_explain_js_and_generic() {
        let dir = project();
        let analyzer = CodeAnalyzer::new(dir.path());
        let js = analyzer.explain_file("src/server.js");
        assert!(js.contains("Functions/Components: start"));
        assert!(js.contains("Imports: express"));

        let md = analyzer.explain_file("README.md");
        assert!(md.contains("Lines: 2"));
        assert!(md.contains("Type: Documentation/Markdown"));
        assert_eq!(analyzer.explain_file("nope.py"), "❌ File not found: nope.py");
    }

    #[test]
    fn test_routes_skip_dependencies() {
        let dir = project();
        let routes = CodeAnalyzer::new(dir.path()).show_api_routes();
        assert!(routes.contains("Flask: /login (app.py)"));
        assert!(routes.contains("Flask: /users (app.py)"));
        assert!(routes.contains("Express GET: /health (server.js)"));
        assert!(!routes.contains("/ignored"));
    }

    #[test]
    fn test_auth_and_calls() {
        let dir = project();
        let analyzer = CodeAnalyzer::new(dir.path());
        assert!(analyzer.find_auth_handlers().contains("app.py: login, token"));

        let calls = analyzer.find_function_calls("login");
        assert!(calls.contains("app.py:9: @app.route('/login')"));
        assert!(calls.contains("app.py:15: login()"));
        assert!(!calls.contains("def login"));
        assert!(analyzer.find_function_calls("missing_fn").contains("not found"));
    }
}
