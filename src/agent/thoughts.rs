//! Decisions and criticisms kept as `cognition` facts.

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::memory::Memory;

#[derive(Debug, Clone, Serialize)]
pub struct Thought {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub confidence: f64,
    pub metadata: Value,
}

#[derive(Clone)]
pub struct ThoughtLog {
    memory: Memory,
}

impl ThoughtLog {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    pub async fn log_thought(&self, kind: &str, content: &str, confidence: f64, metadata: Value) -> Result<Thought> {
        let stamp = chrono::Local::now();
        let thought = Thought {
            timestamp: stamp.to_rfc3339(),
            kind: kind.to_string(),
            content: content.to_string(),
            confidence,
            metadata,
        };
        let key = format!("thought_{}", stamp.format("%Y%m%d%H%M%S%6f"));
        self.memory.remember(&key, &serde_json::to_value(&thought)?, "cognition", Some(kind)).await?;
        Ok(thought)
    }

    pub async fn log_decision(&self, decision: &str, reasoning: &str, options: &[String], chosen: usize) -> Result<Thought> {
        self.log_thought("decision", decision, 1.0, json!({"reasoning": reasoning, "options": options, "chosen": chosen})).await
    }

    pub async fn log_criticism(&self, warning: &str, severity: &str, suggestion: Option<&str>) -> Result<Thought> {
        self.log_thought("criticism", warning, 1.0, json!({"severity": severity, "suggestion": suggestion})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_thoughts_are_cognition_facts() {
        let memory = Memory::in_memory().await.unwrap();
        let log = ThoughtLog::new(memory.clone());
        log.log_decision("Run tests", "file changed", &["tests".to_string()], 0).await.unwrap();
        log.log_criticism("Deletion budget exhausted", "high", None).await.unwrap();

        let facts = memory.recent(10, Some("cognition")).await.unwrap();
        assert_eq!(facts.len(), 2);
        let kinds: Vec<String> = facts.iter().map(|f| f.json()["type"].as_str().unwrap().to_string()).collect();
        assert!(kinds.contains(&"decision".to_string()));
        assert!(kinds.contains(&"criticism".to_string()));
    }
}
