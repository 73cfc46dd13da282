//! OpenAI chat-completions vision caller.

use async_trait::async_trait;
use base64::Engine;
use labelscan_core::{defaults, Error, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::json_extract::extract_first_json_object;
use crate::provider::{extract_chat_text, truncate_body, ModelReply, VisionCaller};

/// Maximum error-body bytes embedded in failure messages.
const ERROR_BODY_LIMIT: usize = 1200;

/// Configuration for the OpenAI caller.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// API key sent as a Bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: defaults::OPENAI_CHAT_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: ChatContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlRef },
}

#[derive(Serialize)]
struct ImageUrlRef {
    url: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Vision caller speaking the OpenAI chat-completions wire format.
pub struct OpenAiCaller {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiCaller {
    /// Create a caller sharing the given HTTP client for connection reuse.
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<ModelReply> {
        debug!(
            model = %request.model,
            "sending chat-completions request"
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("openai request failed: {}", e)))?;

        let status = response.status();
        let raw_wire = response
            .text()
            .await
            .map_err(|e| Error::Inference(format!("openai response read failed: {}", e)))?;
        if status.as_u16() >= 400 {
            return Err(Error::Inference(format!(
                "openai_http_{}: {}",
                status.as_u16(),
                truncate_body(&raw_wire, ERROR_BODY_LIMIT)
            )));
        }

        let payload: Value = serde_json::from_str(&raw_wire)
            .map_err(|e| Error::Inference(format!("openai response not JSON: {}", e)))?;
        let raw_text = extract_chat_text(&payload);
        if raw_text.is_empty() {
            let id = payload["id"].as_str().unwrap_or("unknown");
            let finish = payload["choices"][0]["finish_reason"]
                .as_str()
                .unwrap_or("unknown");
            return Err(Error::Inference(format!(
                "empty_model_response: id={} finish={}",
                id, finish
            )));
        }
        debug!(response_len = raw_text.len(), "chat-completions reply received");
        let parsed = extract_first_json_object(&raw_text)?;
        Ok(ModelReply {
            raw_text,
            parsed,
            raw_wire,
        })
    }
}

#[async_trait]
impl VisionCaller for OpenAiCaller {
    async fn call(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<ModelReply> {
        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: ChatContent::Parts(vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlRef { url: data_url },
                    },
                ]),
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };
        self.send(&request).await
    }

    async fn call_text(&self, prompt: &str) -> Result<ModelReply> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: ChatContent::Text(prompt.to_string()),
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };
        self.send(&request).await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
