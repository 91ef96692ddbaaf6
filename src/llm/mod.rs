//! LLM client module for interacting with language models.
//!
//! Uses RIG with Ollama provider for local LLM inference.

mod client;

pub use client::LlmClient;

/// Slice the outermost JSON object out of free text.
pub fn json_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
