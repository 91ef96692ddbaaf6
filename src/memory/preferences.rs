use std::collections::BTreeMap;

use serde_json::Value;

use super::facts::decode_value;
use super::{Memory, now};
use crate::error::Result;

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    key: String,
    value: String,
}

impl Memory {
    /// Store a preference as JSON text.
    pub async fn set_preference(&self, key: &str, value: &Value, category: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO preferences (key, value, category, updated_at) VALUES (?, ?, ?, ?)")
            .bind(key)
            .bind(value.to_string())
            .bind(category)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn preference(&self, key: &str) -> Result<Option<Value>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?").bind(key).fetch_optional(&self.pool).await?;
        Ok(value.as_deref().map(decode_value))
    }

    /// Boolean preference with a default for missing or mistyped values.
    pub async fn preference_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.preference(key).await?.and_then(|v| v.as_bool()).unwrap_or(default))
    }

    /// Every preference, keyed by name.
    pub async fn all_preferences(&self) -> Result<BTreeMap<String, Value>> {
        self.preferences_where(None).await
    }

    /// Preferences in the `profile` category.
    pub async fn profile(&self) -> Result<BTreeMap<String, Value>> {
        self.preferences_where(Some("profile")).await
    }

    /// The most recently changed preferences.
    pub async fn recent_preferences(&self, limit: i64) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query_as::<_, PreferenceRow>("SELECT key, value FROM preferences ORDER BY updated_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| (row.key, decode_value(&row.value))).collect())
    }

    async fn preferences_where(&self, category: Option<&str>) -> Result<BTreeMap<String, Value>> {
        let rows = sqlx::query_as::<_, PreferenceRow>("SELECT key, value FROM preferences WHERE (? IS NULL OR category = ?)")
            .bind(category)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| (row.key, decode_value(&row.value))).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_preferences_keep_types() {
        let memory = Memory::in_memory().await.unwrap();
        memory.set_preference("confidence_threshold", &json!(0.8), "voice").await.unwrap();
        memory.set_preference("preferred_theme", &json!("dark"), "ui").await.unwrap();
        memory.set_preference("ask_confirmation", &json!(true), "safety").await.unwrap();

        assert_eq!(memory.preference("confidence_threshold").await.unwrap(), Some(json!(0.8)));
        assert_eq!(memory.preference("preferred_theme").await.unwrap(), Some(json!("dark")));
        assert!(memory.preference_bool("ask_confirmation", false).await.unwrap());
        assert!(!memory.preference_bool("missing", false).await.unwrap());
        assert_eq!(memory.all_preferences().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_profile_only_returns_profile_category() {
        let memory = Memory::in_memory().await.unwrap();
        memory.set_preference("preferred_stack", &json!("flask"), "profile").await.unwrap();
        memory.set_preference("preferred_theme", &json!("dark"), "ui").await.unwrap();

        let profile = memory.profile().await.unwrap();
        assert_eq!(profile.len(), 1);
        assert_eq!(profile["preferred_stack"], json!("flask"));
    }
}
