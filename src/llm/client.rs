//! LLM client using RIG with Ollama provider.

use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use rig::agent::Agent;
use rig::client::{CompletionClient, Nothing};
use rig::completion::{Chat, Prompt};
use rig::message::Message;
use rig::providers::ollama;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Result, ValError};

/// Preamble for free-form conversation.
const CHAT_PREAMBLE: &str = "You are VAL, a local voice assistant for software developers. \
Answer in one or two short sentences suitable for speech. Do not use markdown, lists or emojis.";

/// Preamble for structured extraction.
const JSON_PREAMBLE: &str = "You convert developer requests into JSON. Answer with a single JSON object and nothing else.";

enum Backend {
    Ollama {
        json_agent: Agent<ollama::CompletionModel>,
        chat_agent: Agent<ollama::CompletionModel>,
    },
    #[cfg(test)]
    Scripted(Mutex<std::collections::VecDeque<String>>),
}

/// Language model client shared by intent extraction, blueprint generation
/// and conversational replies.
pub struct LlmClient {
    backend: Backend,
    timeout: Duration,
    history: Mutex<Vec<Message>>,
    max_history: usize,
}

impl LlmClient {
    /// Create a new LLM client.
    ///
    /// # Arguments
    /// * `config` - Application configuration
    ///
    /// # Errors
    /// Returns an error if failed to create Ollama client.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        info!("Connecting to Ollama at {}", config.ollama_url);
        info!("Using model: {}", config.ollama_model);

        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(&config.ollama_url)
            .build()
            .context("Failed to create Ollama client")?;

        // Extraction wants deterministic output and room for whole blueprints
        let json_agent = client
            .agent(&config.ollama_model)
            .preamble(JSON_PREAMBLE)
            .temperature(0.2)
            .additional_params(json!({
                "num_ctx": 4096,
                "num_predict": 1024
            }))
            .build();

        let chat_agent = client
            .agent(&config.ollama_model)
            .preamble(CHAT_PREAMBLE)
            .temperature(0.7)
            .additional_params(json!({
                "num_ctx": 1024,
                "num_predict": 150
            }))
            .build();

        Ok(Self {
            backend: Backend::Ollama { json_agent, chat_agent },
            timeout: Duration::from_secs(config.llm_timeout_secs),
            history: Mutex::new(Vec::new()),
            max_history: config.max_history,
        })
    }

    /// Client answering with the given responses in order, then failing.
    #[cfg(test)]
    pub fn scripted(responses: &[&str]) -> Self {
        Self {
            backend: Backend::Scripted(Mutex::new(responses.iter().map(|r| r.to_string()).collect())),
            timeout: Duration::from_secs(1),
            history: Mutex::new(Vec::new()),
            max_history: 5,
        }
    }

    /// Client that is never reachable.
    #[cfg(test)]
    pub fn offline() -> Self {
        Self::scripted(&[])
    }

    /// Send a one-shot prompt and return the raw answer.
    ///
    /// # Arguments
    /// * `prompt` - Complete prompt including any context
    ///
    /// # Errors
    /// Returns `ValError::Llm` if the request fails or times out.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Prompt: {} chars", prompt.len());
        let response = match &self.backend {
            Backend::Ollama { json_agent, .. } => {
                tokio::time::timeout(self.timeout, json_agent.prompt(prompt))
                    .await
                    .map_err(|_| ValError::Llm(format!("no answer within {}s", self.timeout.as_secs())))?
                    .map_err(|e| ValError::Llm(e.to_string()))?
            }
            #[cfg(test)]
            Backend::Scripted(queue) => queue.lock().pop_front().ok_or_else(|| ValError::Llm("connection refused".to_string()))?,
        };
        debug!("Completion: {}", response);
        Ok(response)
    }

    /// Send a conversational message, keeping a short history.
    ///
    /// # Errors
    /// Returns `ValError::Llm` if the request fails or times out.
    pub async fn chat(&self, message: &str) -> Result<String> {
        debug!("User: {}", message);
        let history = self.history.lock().clone();

        let response = match &self.backend {
            Backend::Ollama { chat_agent, .. } => {
                tokio::time::timeout(self.timeout, chat_agent.chat(message, history))
                    .await
                    .map_err(|_| ValError::Llm(format!("no answer within {}s", self.timeout.as_secs())))?
                    .map_err(|e| {
                        warn!("Chat request failed: {}", e);
                        ValError::Llm(e.to_string())
                    })?
            }
            #[cfg(test)]
            Backend::Scripted(queue) => queue.lock().pop_front().ok_or_else(|| ValError::Llm("connection refused".to_string()))?,
        };

        debug!("Assistant: {}", response);

        let mut history = self.history.lock();
        history.push(Message::user(message));
        history.push(Message::assistant(&response));
        while history.len() > self.max_history * 2 {
            history.drain(..2);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let llm = LlmClient::scripted(&["one", "two"]);
        assert_eq!(llm.complete("a").await.unwrap(), "one");
        assert_eq!(llm.chat("b").await.unwrap(), "two");
        assert!(matches!(llm.complete("c").await, Err(ValError::Llm(_))));
    }

    #[tokio::test]
    async fn test_chat_history_is_bounded() {
        let replies: Vec<String> = (0..8).map(|i| format!("reply {}", i)).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let llm = LlmClient::scripted(&refs);
        for i in 0..8 {
            llm.chat(&format!("message {}", i)).await.unwrap();
        }
        assert_eq!(llm.history.lock().len(), 10);
    }
}
