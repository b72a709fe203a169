//! OpenAI-compatible chat-completions client
//!
//! Sends the discovery prompt as a system + user message pair with JSON
//! output requested, and hands back the parsed payload. Rate-limited
//! requests are retried with exponential backoff; every other failure is
//! returned to the caller, which decides whether the work unit is lost.

use super::{extract_json, InferenceError, InferenceService, Prompt};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Builder for creating a ChatCompletionClient
pub struct ChatCompletionClientBuilder {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl Default for ChatCompletionClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout_secs: 120,
        }
    }
}

impl ChatCompletionClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<ChatCompletionClient, InferenceError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::Unavailable("API key is required".to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;

        Ok(ChatCompletionClient {
            http_client,
            base_url: self.base_url,
            api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        })
    }
}

impl ChatCompletionClient {
    pub fn builder() -> ChatCompletionClientBuilder {
        ChatCompletionClientBuilder::default()
    }

    async fn send_request(&self, prompt: &Prompt) -> Result<serde_json::Value, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.user.len(), "sending chat completion request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => InferenceError::Unavailable(format!("unauthorized ({})", status)),
                429 => InferenceError::RequestFailed(format!("rate limited: {}", body)),
                _ => InferenceError::RequestFailed(format!("HTTP {}: {}", status, body)),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(format!("bad envelope: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferenceError::MalformedResponse("empty completion".to_string()))?;

        extract_json(&content).ok_or_else(|| {
            let preview: String = content.chars().take(200).collect();
            InferenceError::MalformedResponse(format!("no JSON in completion: {}", preview))
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            InferenceError::Unavailable(e.to_string())
        } else {
            InferenceError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl InferenceService for ChatCompletionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<serde_json::Value, InferenceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_request(prompt).await {
                Err(InferenceError::RequestFailed(msg))
                    if msg.starts_with("rate limited") && attempts < MAX_RETRY_ATTEMPTS =>
                {
                    let backoff = BACKOFF_BASE_MS * 2u64.pow(attempts - 1);
                    warn!(attempt = attempts, wait_ms = backoff, "rate limited, retrying after backoff");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                other => return other,
            }
        }
    }
}
