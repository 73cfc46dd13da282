//! Vision model caller trait and provider selection.
//!
//! The pipeline talks to remote models exclusively through [`VisionCaller`],
//! so each pass is provider-agnostic. Providers form a small closed set
//! selected by configuration, never by runtime type inspection.

use async_trait::async_trait;
use labelscan_core::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One completed model call: assistant text, the JSON object extracted from
/// it, and the untouched wire response for audit.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub raw_text: String,
    pub parsed: Value,
    pub raw_wire: String,
}

/// Backend for single-turn vision prompts returning JSON.
#[async_trait]
pub trait VisionCaller: Send + Sync {
    /// Send one image plus a prompt, requesting a JSON-only response.
    async fn call(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<ModelReply>;

    /// Send a text-only prompt (pass4 structuring has no image input).
    async fn call_text(&self, prompt: &str) -> Result<ModelReply>;

    /// Model name reported on result records.
    fn model_name(&self) -> &str;
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    Gemini,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown provider: {}", other))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Extract assistant text from an OpenAI chat-completions payload.
///
/// Handles both the plain-string `content` and the parts-array form.
pub fn extract_chat_text(payload: &Value) -> String {
    let content = &payload["choices"][0]["message"]["content"];
    match content {
        Value::String(text) => text.trim().to_string(),
        Value::Array(parts) => {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .filter(|t| !t.is_empty())
                .collect();
            chunks.join("\n").trim().to_string()
        }
        _ => String::new(),
    }
}

/// Extract assistant text from a Gemini generateContent payload.
pub fn extract_generate_text(payload: &Value) -> String {
    let parts = &payload["candidates"][0]["content"]["parts"];
    match parts {
        Value::Array(parts) => {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .filter(|t| !t.is_empty())
                .collect();
            chunks.join("\n").trim().to_string()
        }
        _ => String::new(),
    }
}

/// Truncate an HTTP body for error messages, staying on a char boundary.
pub(crate) fn truncate_body(body: &str, max_bytes: usize) -> &str {
    if body.len() <= max_bytes {
        return body;
    }
    let mut end = max_bytes;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
