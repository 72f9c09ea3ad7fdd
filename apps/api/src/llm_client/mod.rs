/// LLM Client: the single point of entry for completion-provider calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider directly.
/// The orchestrator holds an `Arc<dyn CompletionProvider>`; `LlmClient` is the
/// production implementation against an OpenAI-compatible chat endpoint.
///
/// One request per submission. Nothing here retries: a rate limit or outage is
/// classified and handed back so the caller decides whether to resubmit.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::challenge::prompts::CHALLENGE_SYSTEM;
use crate::config::CompletionConfig;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion endpoint not found: {0}")]
    NotFound(String),

    #[error("completion provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Rate limit reached: {0}")]
    RateLimited(String),

    #[error("completion provider error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("completion provider returned no content")]
    EmptyCompletion,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode completion response: {0}")]
    Parse(String),
}

/// Anything that can turn a prompt into challenge text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Trimmed text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Chat-completion client. Cheap to clone; the inner `reqwest::Client` is shared.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Makes the raw call, returning the decoded response object.
    pub async fn call(&self, prompt: &str) -> Result<ChatResponse, CompletionError> {
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: CHALLENGE_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse error message
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("Completion provider returned {status}: {message}");
            return Err(classify_status(status, message));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(chat_response)
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let response = self.call(prompt).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(CompletionError::EmptyCompletion)
    }
}

/// Maps a non-success provider status to the completion error taxonomy.
fn classify_status(status: StatusCode, message: String) -> CompletionError {
    match status {
        StatusCode::NOT_FOUND => CompletionError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited(message),
        other => CompletionError::Upstream {
            status: other.as_u16(),
            message,
        },
    }
}
