//! Gemini generateContent vision caller.

use async_trait::async_trait;
use base64::Engine;
use labelscan_core::{defaults, Error, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::json_extract::extract_first_json_object;
use crate::provider::{extract_generate_text, truncate_body, ModelReply, VisionCaller};

const ERROR_BODY_LIMIT: usize = 1200;

/// Configuration for the Gemini caller.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL up to `/models` (model name and key are appended).
    pub base_url: String,
    /// API key passed as a query parameter, per the generativelanguage API.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: defaults::GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

/// Vision caller speaking the Gemini generateContent wire format.
#[derive(Debug)]
pub struct GeminiCaller {
    client: Client,
    config: GeminiConfig,
}

impl GeminiCaller {
    /// Create a caller sharing the given HTTP client for connection reuse.
    pub fn new(client: Client, config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config(
                "gemini_api_key_missing (set GEMINI_API_KEY or GOOGLE_API_KEY)".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn send(&self, parts: Vec<Part>) -> Result<ModelReply> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        );
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
            },
        };
        debug!(model = %self.config.model, "sending generateContent request");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("gemini request failed: {}", e)))?;

        let status = response.status();
        let raw_wire = response
            .text()
            .await
            .map_err(|e| Error::Inference(format!("gemini response read failed: {}", e)))?;
        if status.as_u16() >= 400 {
            return Err(Error::Inference(format!(
                "gemini_http_{}: {}",
                status.as_u16(),
                truncate_body(&raw_wire, ERROR_BODY_LIMIT)
            )));
        }

        let payload: Value = serde_json::from_str(&raw_wire)
            .map_err(|e| Error::Inference(format!("gemini response not JSON: {}", e)))?;
        let raw_text = extract_generate_text(&payload);
        if raw_text.is_empty() {
            return Err(Error::Inference("empty_gemini_response".to_string()));
        }
        debug!(response_len = raw_text.len(), "generateContent reply received");
        let parsed = extract_first_json_object(&raw_text)?;
        Ok(ModelReply {
            raw_text,
            parsed,
            raw_wire,
        })
    }
}

#[async_trait]
impl VisionCaller for GeminiCaller {
    async fn call(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<ModelReply> {
        let parts = vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(image),
                },
            },
        ];
        self.send(parts).await
    }

    async fn call_text(&self, prompt: &str) -> Result<ModelReply> {
        self.send(vec![Part::Text {
            text: prompt.to_string(),
        }])
        .await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
