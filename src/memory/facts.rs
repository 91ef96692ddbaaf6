use serde::Serialize;
use serde_json::Value;

use super::{Memory, now};
use crate::error::Result;

/// A row of the `memory` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Fact {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
    pub tags: Option<String>,
    pub confidence: f64,
    pub created_at: String,
    pub updated_at: String,
    pub access_count: i64,
}

impl Fact {
    /// Stored value, decoded as JSON when possible.
    pub fn json(&self) -> Value {
        decode_value(&self.value)
    }
}

/// Strings are stored verbatim, everything else as JSON text.
pub(crate) fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn decode_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

impl Memory {
    /// Store or update a fact.
    ///
    /// Updating an existing key replaces value and tags and counts as an access.
    pub async fn remember(&self, key: &str, value: &Value, kind: &str, tags: Option<&str>) -> Result<()> {
        let stamp = now();
        sqlx::query(
            "INSERT INTO memory (type, key, value, tags, confidence, created_at, updated_at, access_count) \
             VALUES (?, ?, ?, ?, 1.0, ?, ?, 0) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, tags = excluded.tags, \
             updated_at = excluded.updated_at, access_count = memory.access_count + 1",
        )
        .bind(kind)
        .bind(key)
        .bind(encode_value(value))
        .bind(tags)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read a fact and bump its access counter.
    pub async fn recall(&self, key: &str) -> Result<Option<Value>> {
        let fact = sqlx::query_as::<_, Fact>("SELECT * FROM memory WHERE key = ?").bind(key).fetch_optional(&self.pool).await?;

        let Some(fact) = fact else {
            return Ok(None);
        };

        sqlx::query("UPDATE memory SET access_count = access_count + 1 WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(Some(fact.json()))
    }

    /// Delete a fact. Returns true when something was removed.
    pub async fn forget(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM memory WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Substring search over values and tags, most used first.
    pub async fn search(&self, query: &str, kind: Option<&str>, limit: i64) -> Result<Vec<Fact>> {
        let pattern = format!("%{}%", query);
        let facts = sqlx::query_as::<_, Fact>(
            "SELECT * FROM memory WHERE (value LIKE ? OR tags LIKE ?) AND (? IS NULL OR type = ?) \
             ORDER BY access_count DESC, updated_at DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(kind)
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(facts)
    }

    /// Most recently updated facts, optionally of one type.
    pub async fn recent(&self, limit: i64, kind: Option<&str>) -> Result<Vec<Fact>> {
        let facts = sqlx::query_as::<_, Fact>("SELECT * FROM memory WHERE (? IS NULL OR type = ?) ORDER BY updated_at DESC, id DESC LIMIT ?")
            .bind(kind)
            .bind(kind)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_remember_and_recall() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember("default_path", &json!("/home/dev/Projects"), "fact", None).await.unwrap();
        memory.remember("sizes", &json!({"small": 1}), "fact", Some("config")).await.unwrap();

        assert_eq!(memory.recall("default_path").await.unwrap(), Some(json!("/home/dev/Projects")));
        assert_eq!(memory.recall("sizes").await.unwrap(), Some(json!({"small": 1})));
        assert_eq!(memory.recall("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_bumps_access_count() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember("editor", &json!("vim"), "fact", None).await.unwrap();
        memory.remember("editor", &json!("helix"), "fact", None).await.unwrap();
        memory.recall("editor").await.unwrap();

        let facts = memory.search("helix", None, 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].access_count, 2);
    }

    #[tokio::test]
    async fn test_forget_reports_deletion() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember("temp", &json!("x"), "fact", None).await.unwrap();
        assert!(memory.forget("temp").await.unwrap());
        assert!(!memory.forget("temp").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_skips_keys() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember("workflow_ab12cd34", &json!({"actions": ["git_init"]}), "workflow", None).await.unwrap();
        memory.remember("deploy", &json!("run the workflow script"), "fact", None).await.unwrap();

        let facts = memory.search("workflow", None, 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "deploy");
    }

    #[tokio::test]
    async fn test_search_type_filter_applies_to_tag_matches() {
        let memory = Memory::in_memory().await.unwrap();
        memory.remember("a", &json!("alpha"), "tip", Some("greek")).await.unwrap();
        memory.remember("b", &json!("beta"), "fact", Some("greek")).await.unwrap();

        let facts = memory.search("greek", Some("fact"), 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "b");
    }
}
