//! Scripted model caller for unit tests.

use async_trait::async_trait;
use labelscan_core::{Error, Result};
use labelscan_inference::{ModelReply, VisionCaller};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a fixed queue of JSON replies, or fails every call with a fixed
/// error. Counts calls so tests can assert which stages actually ran.
pub(crate) struct ScriptedCaller {
    model: String,
    replies: Mutex<VecDeque<Value>>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedCaller {
    pub fn new(model: &str, replies: Vec<Value>) -> Self {
        Self {
            model: model.to_string(),
            replies: Mutex::new(replies.into()),
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(model: &str, error: &str) -> Self {
        Self {
            model: model.to_string(),
            replies: Mutex::new(VecDeque::new()),
            error: Some(error.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(Error::Inference(error.clone()));
        }
        let parsed = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Inference("scripted replies exhausted".to_string()))?;
        let raw_text = parsed.to_string();
        Ok(ModelReply {
            raw_wire: raw_text.clone(),
            raw_text,
            parsed,
        })
    }
}

#[async_trait]
impl VisionCaller for ScriptedCaller {
    async fn call(&self, _image: &[u8], _mime_type: &str, _prompt: &str) -> Result<ModelReply> {
        self.next_reply()
    }

    async fn call_text(&self, _prompt: &str) -> Result<ModelReply> {
        self.next_reply()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
