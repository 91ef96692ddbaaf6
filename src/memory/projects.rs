use serde::Serialize;
use serde_json::json;

use super::{Memory, now};
use crate::blueprint::Blueprint;
use crate::error::Result;

/// A row of the `projects` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub project_type: Option<String>,
    pub blueprint: Option<String>,
    pub created_at: String,
    pub last_accessed: String,
}

impl ProjectRecord {
    /// Blueprint the project was created from, if it was stored.
    pub fn blueprint(&self) -> Option<Blueprint> {
        serde_json::from_str(self.blueprint.as_deref()?).ok()
    }
}

impl Memory {
    /// Record a created or opened project and make it the last project.
    pub async fn remember_project(&self, name: &str, path: &str, project_type: &str, blueprint: Option<&Blueprint>) -> Result<()> {
        let stamp = now();
        let blueprint_json = blueprint.map(serde_json::to_string).transpose()?;

        sqlx::query(
            "INSERT INTO projects (name, path, project_type, blueprint, created_at, last_accessed) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(path) DO UPDATE SET name = excluded.name, project_type = excluded.project_type, \
             blueprint = COALESCE(excluded.blueprint, projects.blueprint), last_accessed = excluded.last_accessed",
        )
        .bind(name)
        .bind(path)
        .bind(project_type)
        .bind(blueprint_json)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        self.remember("last_project", &json!({"name": name, "path": path}), "context", None).await
    }

    pub async fn last_project(&self) -> Result<Option<ProjectRecord>> {
        let project = sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects ORDER BY last_accessed DESC, id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    pub async fn projects_by_type(&self, project_type: &str, limit: i64) -> Result<Vec<ProjectRecord>> {
        let projects = sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects WHERE project_type = ? ORDER BY last_accessed DESC LIMIT ?")
            .bind(project_type)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(projects)
    }

    pub async fn list_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>> {
        let projects = sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects ORDER BY last_accessed DESC, id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(projects)
    }

    /// Most recently used project with the given name (case-insensitive).
    pub async fn find_project(&self, name: &str) -> Result<Option<ProjectRecord>> {
        let project = sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects WHERE lower(name) = lower(?) ORDER BY last_accessed DESC LIMIT 1")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    /// Mark a project as accessed now.
    pub async fn touch_project(&self, project: &ProjectRecord) -> Result<()> {
        sqlx::query("UPDATE projects SET last_accessed = ? WHERE id = ?").bind(now()).bind(project.id).execute(&self.pool).await?;
        self.remember("last_project", &json!({"name": project.name, "path": project.path}), "context", None).await
    }
}
