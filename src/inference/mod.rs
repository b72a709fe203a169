//! Inference service: the external model that proposes relationships
//!
//! Defines the service trait and the structured-output helpers the
//! discovery engine relies on. Two implementations:
//! - `ChatCompletionClient`: OpenAI-compatible HTTP endpoint (production)
//! - `MockInference`: returns preconfigured payloads (testing)

mod chat;

pub use chat::{ChatCompletionClient, ChatCompletionClientBuilder, DEFAULT_BASE_URL};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A two-part prompt: fixed instructions plus the per-call request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Errors from inference calls.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference service not available: {0}")]
    Unavailable(String),
    #[error("inference request failed: {0}")]
    RequestFailed(String),
    #[error("inference request timed out after {0}s")]
    Timeout(u64),
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

/// Client trait for the inference service.
///
/// Abstracts over transport (HTTP, mock) so the discovery engine
/// doesn't depend on how the model is reached. `complete` must return
/// structured JSON; free text that cannot be parsed is a
/// `MalformedResponse`, never a partial success.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Identifier recorded as `discovered_by` on every proposal.
    fn model_name(&self) -> &str;

    /// Run one completion and return its structured payload.
    async fn complete(&self, prompt: &Prompt) -> Result<serde_json::Value, InferenceError>;
}

/// Extract a JSON document from model output.
///
/// Models sometimes wrap JSON in markdown code fences or add explanation text.
/// This function tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from ```json ... ``` or ``` ... ``` fenced block
/// 3. The outermost `{ ... }` or `[ ... ]` span
///
/// Only objects and arrays are accepted.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    fn structured(candidate: &str) -> Option<serde_json::Value> {
        serde_json::from_str::<serde_json::Value>(candidate.trim())
            .ok()
            .filter(|v| v.is_object() || v.is_array())
    }

    let trimmed = text.trim();

    if let Some(v) = structured(trimmed) {
        return Some(v);
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };
    if let Some(v) = fenced.and_then(structured) {
        return Some(v);
    }

    // Whichever bracket opens first is the outermost document
    let mut spans: Vec<(usize, char)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| trimmed.find(open).map(|start| (start, close)))
        .collect();
    spans.sort();
    for (start, close) in spans {
        if let Some(end) = trimmed.rfind(close) {
            if start < end {
                if let Some(v) = structured(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }

    None
}

enum MockReply {
    Payload(serde_json::Value),
    Failure(String),
}

/// Mock service for testing; returns preconfigured payloads.
///
/// Rules are matched in registration order against the prompt's user
/// text; the first rule whose needle appears wins. Prompts matching no
/// rule get the fallback (an empty array unless configured).
pub struct MockInference {
    model: String,
    rules: Vec<(String, MockReply)>,
    fallback: Option<MockReply>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl Default for MockInference {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInference {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            rules: Vec::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Reply with `payload` when the prompt mentions `needle`.
    pub fn respond_when(mut self, needle: impl Into<String>, payload: serde_json::Value) -> Self {
        self.rules.push((needle.into(), MockReply::Payload(payload)));
        self
    }

    /// Fail with a request error when the prompt mentions `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push((needle.into(), MockReply::Failure(message.into())));
        self
    }

    /// Reply for prompts matching no rule.
    pub fn with_fallback(mut self, payload: serde_json::Value) -> Self {
        self.fallback = Some(MockReply::Payload(payload));
        self
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for MockInference {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<serde_json::Value, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());

        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.user.contains(needle.as_str()))
            .map(|(_, reply)| reply);

        match rule.or(self.fallback.as_ref()) {
            Some(MockReply::Payload(v)) => Ok(v.clone()),
            Some(MockReply::Failure(msg)) => Err(InferenceError::RequestFailed(msg.clone())),
            None => Ok(serde_json::Value::Array(Vec::new())),
        }
    }
}
