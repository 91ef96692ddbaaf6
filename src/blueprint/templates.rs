//! Built-in project templates.

use super::{Blueprint, FileEntry};
use crate::intent::IntentKind;

/// Predefined project layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectTemplate {
    Folder,
    Flask,
    Django,
    Flutter,
    React,
    Vue,
    Svelte,
    Node,
    Web,
    Data,
}

const NODE_GITIGNORE: &str = "node_modules/\n.env\ndist/\n";
const PYTHON_GITIGNORE: &str = "__pycache__/\n*.pyc\n.venv/\n.env\n";

impl ProjectTemplate {
    /// Project type recorded in memory.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectTemplate::Folder => "folder",
            ProjectTemplate::Flask => "flask",
            ProjectTemplate::Django => "django",
            ProjectTemplate::Flutter => "flutter",
            ProjectTemplate::React => "react",
            ProjectTemplate::Vue => "vue",
            ProjectTemplate::Svelte => "svelte",
            ProjectTemplate::Node => "node",
            ProjectTemplate::Web => "web",
            ProjectTemplate::Data => "data",
        }
    }

    /// Name used when the user gives none.
    pub fn default_name(&self) -> &'static str {
        match self {
            ProjectTemplate::React => "react_app",
            ProjectTemplate::Vue => "vue_app",
            ProjectTemplate::Svelte => "svelte_app",
            ProjectTemplate::Node => "node_app",
            ProjectTemplate::Web => "website",
            _ => "unnamed_project",
        }
    }

    /// Template for a project-creation intent.
    pub fn for_kind(kind: &IntentKind) -> Option<Self> {
        match kind {
            IntentKind::CreateFlaskProject => Some(ProjectTemplate::Flask),
            IntentKind::CreateDjangoProject => Some(ProjectTemplate::Django),
            IntentKind::CreateFlutterProject => Some(ProjectTemplate::Flutter),
            IntentKind::CreateReactProject => Some(ProjectTemplate::React),
            IntentKind::CreateVueProject => Some(ProjectTemplate::Vue),
            IntentKind::CreateSvelteProject => Some(ProjectTemplate::Svelte),
            IntentKind::CreateNodeProject => Some(ProjectTemplate::Node),
            IntentKind::CreateWebProject => Some(ProjectTemplate::Web),
            IntentKind::CreateDataProject => Some(ProjectTemplate::Data),
            _ => None,
        }
    }

    /// Best template for a stored project type (substring match).
    pub fn for_project_type(project_type: &str) -> Option<Self> {
        let project_type = project_type.to_lowercase();
        [
            ProjectTemplate::Flutter,
            ProjectTemplate::Flask,
            ProjectTemplate::Django,
            ProjectTemplate::React,
            ProjectTemplate::Vue,
            ProjectTemplate::Svelte,
            ProjectTemplate::Node,
            ProjectTemplate::Web,
            ProjectTemplate::Data,
        ]
        .into_iter()
        .find(|t| project_type.contains(t.as_str()))
    }

    /// Render the blueprint for a project called `name`.
    pub fn blueprint(&self, name: &str) -> Blueprint {
        let folders = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self {
            ProjectTemplate::Folder => Blueprint::default(),
            ProjectTemplate::Flask => Blueprint {
                folders: folders(&["app", "app/models", "app/routes", "templates", "static", "tests"]),
                files: vec![
                    FileEntry::new("app/__init__.py", "from flask import Flask\n\n\ndef create_app():\n    app = Flask(__name__)\n    from app.routes import bp\n    app.register_blueprint(bp)\n    return app\n"),
                    FileEntry::new("app/models/__init__.py", ""),
                    FileEntry::new("app/routes/__init__.py", "from flask import Blueprint\n\nbp = Blueprint(\"main\", __name__)\n\n\n@bp.route(\"/\")\ndef index():\n    return {\"status\": \"ok\"}\n"),
                    FileEntry::new("app.py", "from app import create_app\n\napp = create_app()\n\nif __name__ == \"__main__\":\n    app.run(debug=True)\n"),
                    FileEntry::new("requirements.txt", "flask==3.0.0\n"),
                    FileEntry::new(".gitignore", PYTHON_GITIGNORE),
                    FileEntry::new("README.md", format!("# {}\n\nFlask application.\n", name)),
                ],
            },
            ProjectTemplate::Django => Blueprint {
                folders: folders(&[name, "apps", "templates", "static", "tests"]),
                files: vec![
                    FileEntry::new("manage.py", format!("#!/usr/bin/env python\nimport os\nimport sys\n\nif __name__ == \"__main__\":\n    os.environ.setdefault(\"DJANGO_SETTINGS_MODULE\", \"{}.settings\")\n    from django.core.management import execute_from_command_line\n    execute_from_command_line(sys.argv)\n", name)),
                    FileEntry::new(format!("{}/__init__.py", name), ""),
                    FileEntry::new(format!("{}/settings.py", name), "DEBUG = True\nINSTALLED_APPS = []\n"),
                    FileEntry::new(format!("{}/urls.py", name), "from django.urls import path\n\nurlpatterns = []\n"),
                    FileEntry::new("requirements.txt", "django==5.0\n"),
                    FileEntry::new(".gitignore", PYTHON_GITIGNORE),
                    FileEntry::new("README.md", format!("# {}\n\nDjango application.\n", name)),
                ],
            },
            ProjectTemplate::Flutter => Blueprint {
                folders: folders(&["lib", "lib/screens", "lib/widgets", "lib/services", "lib/models", "assets/images", "assets/icons", "test"]),
                files: vec![
                    FileEntry::new("lib/main.dart", "import 'package:flutter/material.dart';\n\nvoid main() => runApp(const MaterialApp(home: Scaffold()));\n"),
                    FileEntry::new("pubspec.yaml", format!("name: {}\ndependencies:\n  flutter:\n    sdk: flutter\n", name)),
                    FileEntry::new("README.md", format!("# {}\n\nFlutter application.\n", name)),
                ],
            },
            ProjectTemplate::React => Blueprint {
                folders: folders(&["src", "src/components", "src/pages", "src/hooks", "public", "assets", "styles"]),
                files: vec![
                    FileEntry::new("package.json", format!("{{\n  \"name\": \"{}\",\n  \"version\": \"1.0.0\",\n  \"scripts\": {{ \"start\": \"react-scripts start\" }}\n}}\n", name)),
                    FileEntry::new("README.md", format!("# {}\n\nReact application.\n", name)),
                    FileEntry::new(".gitignore", NODE_GITIGNORE),
                    FileEntry::new("src/index.js", "import React from 'react';\nimport { createRoot } from 'react-dom/client';\nimport App from './App';\n\ncreateRoot(document.getElementById('root')).render(<App />);\n"),
                    FileEntry::new("src/App.js", "export default function App() {\n  return <h1>Hello</h1>;\n}\n"),
                    FileEntry::new("public/index.html", format!("<!DOCTYPE html>\n<html>\n<head>\n  <title>{}</title>\n</head>\n<body>\n  <div id=\"root\"></div>\n</body>\n</html>\n", name)),
                ],
            },
            ProjectTemplate::Vue => Blueprint {
                folders: folders(&["src", "src/components", "src/views", "public"]),
                files: vec![
                    FileEntry::new("package.json", format!("{{\n  \"name\": \"{}\",\n  \"version\": \"1.0.0\",\n  \"scripts\": {{ \"dev\": \"vite\" }}\n}}\n", name)),
                    FileEntry::new("src/main.js", "import { createApp } from 'vue';\nimport App from './App.vue';\n\ncreateApp(App).mount('#app');\n"),
                    FileEntry::new("src/App.vue", "<template>\n  <h1>Hello</h1>\n</template>\n"),
                    FileEntry::new("index.html", "<!DOCTYPE html>\n<html>\n<body>\n  <div id=\"app\"></div>\n  <script type=\"module\" src=\"/src/main.js\"></script>\n</body>\n</html>\n"),
                    FileEntry::new(".gitignore", NODE_GITIGNORE),
                    FileEntry::new("README.md", format!("# {}\n\nVue application.\n", name)),
                ],
            },
            ProjectTemplate::Svelte => Blueprint {
                folders: folders(&["src", "src/lib", "public"]),
                files: vec![
                    FileEntry::new("package.json", format!("{{\n  \"name\": \"{}\",\n  \"version\": \"1.0.0\",\n  \"scripts\": {{ \"dev\": \"vite\" }}\n}}\n", name)),
                    FileEntry::new("src/main.js", "import App from './App.svelte';\n\nexport default new App({ target: document.body });\n"),
                    FileEntry::new("src/App.svelte", "<h1>Hello</h1>\n"),
                    FileEntry::new(".gitignore", NODE_GITIGNORE),
                    FileEntry::new("README.md", format!("# {}\n\nSvelte application.\n", name)),
                ],
            },
            ProjectTemplate::Node => Blueprint {
                folders: folders(&["src", "routes", "models", "middleware", "config", "tests"]),
                files: vec![
                    FileEntry::new("package.json", format!("{{\n  \"name\": \"{}\",\n  \"main\": \"src/index.js\",\n  \"scripts\": {{ \"start\": \"node src/index.js\" }}\n}}\n", name)),
                    FileEntry::new("src/index.js", "console.log('Hello Node!');\n"),
                    FileEntry::new(".env.example", "PORT=3000\n"),
                    FileEntry::new(".gitignore", NODE_GITIGNORE),
                    FileEntry::new("README.md", format!("# {}\n\nNode.js application.\n", name)),
                ],
            },
            ProjectTemplate::Web => Blueprint {
                folders: folders(&["css", "js", "images"]),
                files: vec![
                    FileEntry::new("index.html", format!("<!DOCTYPE html>\n<html>\n<head>\n  <title>{0}</title>\n  <link rel=\"stylesheet\" href=\"css/style.css\">\n</head>\n<body>\n  <h1>Welcome to {0}</h1>\n  <script src=\"js/app.js\"></script>\n</body>\n</html>\n", name)),
                    FileEntry::new("css/style.css", "body { font-family: Arial; margin: 40px; }\n"),
                    FileEntry::new("js/app.js", "console.log('Website loaded');\n"),
                    FileEntry::new("README.md", format!("# {}\n\nStatic website.\n", name)),
                ],
            },
            ProjectTemplate::Data => Blueprint {
                folders: folders(&["data", "notebooks", "scripts", "reports"]),
                files: vec![
                    FileEntry::new("README.md", format!("# {}\n\nData science project.\n", name)),
                    FileEntry::new("requirements.txt", "pandas\nnumpy\njupyter\n"),
                    FileEntry::new("notebooks/analysis.ipynb", "{\"cells\": [], \"metadata\": {}, \"nbformat\": 4, \"nbformat_minor\": 5}\n"),
                    FileEntry::new("scripts/process.py", "\"\"\"Data processing script.\"\"\"\n"),
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_validate() {
        for template in [
            ProjectTemplate::Folder,
            ProjectTemplate::Flask,
            ProjectTemplate::Django,
            ProjectTemplate::Flutter,
            ProjectTemplate::React,
            ProjectTemplate::Vue,
            ProjectTemplate::Svelte,
            ProjectTemplate::Node,
            ProjectTemplate::Web,
            ProjectTemplate::Data,
        ] {
            let blueprint = template.blueprint("demo");
            assert_eq!(blueprint.clone().validate().unwrap(), blueprint, "{:?}", template);
        }
    }

    #[test]
    fn test_name_is_rendered() {
        let blueprint = ProjectTemplate::React.blueprint("shop");
        let package = blueprint.files.iter().find(|f| f.path == "package.json").unwrap();
        assert!(package.content.contains("\"name\": \"shop\""));
    }

    #[test]
    fn test_lookup_by_type_and_kind() {
        assert_eq!(ProjectTemplate::for_project_type("flutter_app"), Some(ProjectTemplate::Flutter));
        assert_eq!(ProjectTemplate::for_project_type("ai_generated"), None);
        assert_eq!(ProjectTemplate::for_kind(&IntentKind::CreateNodeProject), Some(ProjectTemplate::Node));
        assert_eq!(ProjectTemplate::Web.default_name(), "website");
    }
}
