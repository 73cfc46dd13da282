//! # labelscan-inference
//!
//! Remote-model plumbing for the labelscan pipeline:
//! - `VisionCaller` trait with OpenAI and Gemini implementations
//! - Robust JSON extraction from model output text
//! - The shared retry/backoff policy (generic and rate-limit curves)
//! - The bounded, retried image fetcher

pub mod fetcher;
pub mod gemini;
pub mod json_extract;
pub mod openai;
pub mod provider;
pub mod retry;

pub use fetcher::{guess_mime_type, ImageFetcher};
pub use gemini::{GeminiCaller, GeminiConfig};
pub use json_extract::{extract_first_json_object, strip_code_fence};
pub use openai::{OpenAiCaller, OpenAiConfig};
pub use provider::{extract_chat_text, extract_generate_text, ModelReply, Provider, VisionCaller};
pub use retry::{
    is_rate_limit_error, is_transient_error, retry_generic, retry_rate_limited, RetryPolicy,
};
