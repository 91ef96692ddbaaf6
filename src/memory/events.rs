use serde::Serialize;
use serde_json::{Value, json};

use super::{Memory, now};
use crate::error::Result;
use crate::intent::Intent;

/// A row of the `events` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub intent: Option<String>,
    pub action: Option<String>,
    pub data: Option<String>,
    pub result: Option<String>,
    pub success: bool,
    pub created_at: String,
}

impl EventRecord {
    /// Intent stored with the event, if it parses.
    pub fn intent(&self) -> Option<Intent> {
        serde_json::from_str(self.intent.as_deref()?).ok()
    }

    /// Wire name of the stored intent kind.
    pub fn intent_name(&self) -> Option<String> {
        self.intent()?.intent.map(String::from)
    }
}

/// Builder for an event to be logged.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: String,
    intent: Option<Intent>,
    action: Option<String>,
    data: Option<Value>,
    result: Option<String>,
    success: bool,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), intent: None, action: None, data: None, result: None, success: true }
    }

    pub fn intent(mut self, intent: &Intent) -> Self {
        self.intent = Some(intent.clone());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

impl Memory {
    /// Append an event.
    ///
    /// Clarification events that carry data also teach a
    /// `clarification_<intent>` fact so the choice can be reused.
    pub async fn log_event(&self, event: Event) -> Result<()> {
        let intent_json = event.intent.as_ref().map(serde_json::to_string).transpose()?;
        let data_json = event.data.as_ref().map(Value::to_string);

        sqlx::query("INSERT INTO events (event_type, intent, action, data, result, success, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)")
            .bind(&event.event_type)
            .bind(intent_json)
            .bind(&event.action)
            .bind(data_json)
            .bind(&event.result)
            .bind(event.success)
            .bind(now())
            .execute(&self.pool)
            .await?;

        if event.event_type.contains("clarifying")
            && let Some(data) = &event.data
        {
            let intent_name = event.intent.as_ref().map(|i| i.kind_name().to_string()).unwrap_or_else(|| "unknown".to_string());
            let learning = json!({
                "choice": data.get("choice").cloned().unwrap_or(Value::Null),
                "options": data.get("options").cloned().unwrap_or(Value::Null),
            });
            self.remember(&format!("clarification_{}", intent_name), &learning, "learning", None).await?;
        }

        Ok(())
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let events = sqlx::query_as::<_, EventRecord>("SELECT * FROM events ORDER BY created_at DESC, id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    /// Most recent events of one type, newest first.
    pub async fn recent_events_of(&self, event_type: &str, limit: i64) -> Result<Vec<EventRecord>> {
        let events = sqlx::query_as::<_, EventRecord>("SELECT * FROM events WHERE event_type = ? ORDER BY created_at DESC, id DESC LIMIT ?")
            .bind(event_type)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }
}
