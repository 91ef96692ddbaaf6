//! Dockerfile generation.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use super::env::ProjectKind;
use super::undo::{UndoAction, UndoManager};

const PYTHON_DOCKERFILE: &str = "FROM python:3.12-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
EXPOSE 5000
CMD [\"python\", \"app.py\"]
";

const NODE_DOCKERFILE: &str = "FROM node:20-alpine
WORKDIR /app
COPY package*.json ./
RUN npm install
COPY . .
EXPOSE 3000
CMD [\"npm\", \"start\"]
";

const FLUTTER_DOCKERFILE: &str = "FROM ghcr.io/cirruslabs/flutter:stable AS build
WORKDIR /app
COPY . .
RUN flutter build web

FROM nginx:alpine
COPY --from=build /app/build/web /usr/share/nginx/html
EXPOSE 80
";

const STATIC_DOCKERFILE: &str = "FROM nginx:alpine
COPY . /usr/share/nginx/html
EXPOSE 80
";

pub fn dockerfile(kind: ProjectKind) -> &'static str {
    match kind {
        ProjectKind::Python => PYTHON_DOCKERFILE,
        ProjectKind::Node => NODE_DOCKERFILE,
        ProjectKind::Flutter => FLUTTER_DOCKERFILE,
        ProjectKind::General => STATIC_DOCKERFILE,
    }
}

pub fn dockerignore(kind: ProjectKind) -> &'static str {
    match kind {
        ProjectKind::Python => "__pycache__/\n*.pyc\n.venv/\n.env\n.git/\n",
        ProjectKind::Node => "node_modules/\nnpm-debug.log\n.env\n.git/\n",
        ProjectKind::Flutter => ".dart_tool/\nbuild/\n.env\n.git/\n",
        ProjectKind::General => ".env\n.git/\n",
    }
}

/// Write a `Dockerfile` and `.dockerignore` for the project, keeping existing ones.
pub fn add_docker(cwd: &Path, undo: &UndoManager) -> Result<String> {
    let kind = ProjectKind::detect(cwd);
    let mut created = Vec::new();
    for (file, content) in [("Dockerfile", dockerfile(kind)), (".dockerignore", dockerignore(kind))] {
        let path = cwd.join(file);
        if !path.exists() {
            std::fs::write(&path, content)?;
            created.push(path);
        }
    }

    if created.is_empty() {
        return Ok(format!("ℹ️ Docker files already exist in {}", cwd.display()));
    }
    undo.log_operation("add_docker", json!({"path": cwd, "type": kind.as_str()}), UndoAction::RemoveCreated { paths: created })?;
    Ok(format!("🐳 Docker setup added for {} project at {}", kind.as_str(), cwd.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    #[tokio::test]
    async fn test_add_docker_for_node() {
        let dir = tempfile::tempdir().unwrap();
        let undo = UndoManager::open(&dir.path().join("logs"), Memory::in_memory().await.unwrap()).unwrap();
        let project = dir.path().join("app");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("package.json"), "{}").unwrap();

        assert!(add_docker(&project, &undo).unwrap().starts_with("🐳"));
        assert!(std::fs::read_to_string(project.join("Dockerfile")).unwrap().contains("npm start"));
        assert!(std::fs::read_to_string(project.join(".dockerignore")).unwrap().contains("node_modules/"));
        assert!(add_docker(&project, &undo).unwrap().starts_with("ℹ️"));

        undo.undo_last().await;
        assert!(!project.join("Dockerfile").exists());
        assert!(project.join("package.json").exists());
    }
}
