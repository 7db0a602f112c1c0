//! Abstract language-model interface
//!
//! C2 (query formulation), C4 (resolution generation), and C5 (evaluation)
//! depend only on this trait. Provider selection — which HTTP endpoint,
//! which actual model — is external to the core; the default implementation
//! below talks to a router over HTTP the way a production deployment would,
//! but tests supply stub implementations instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Selects temperature, token budget, and a logical model tag for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_tag: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn new(model_tag: impl Into<String>) -> Self {
        Self {
            model_tag: model_tag.into(),
            temperature: 0.3,
            max_tokens: 2048,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Errors surfaced by a language-model call
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(String),

    #[error("model returned an error status: {0}")]
    BadStatus(u16),

    #[error("model call timed out")]
    Timeout,

    #[error("model response could not be parsed: {0}")]
    MalformedResponse(String),
}

/// The abstract completion port every language-model-consuming component
/// depends on.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, config: &ModelConfig) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Default production implementation: an OpenAI-compatible chat-completions
/// endpoint reached over HTTP, matching the shape of an internal model
/// router.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    router_url: String,
}

impl HttpLanguageModel {
    pub fn new(router_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("failed to build reqwest client"),
            router_url: router_url.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &str, config: &ModelConfig) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &config.model_tag,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = tokio::time::timeout(
            config.timeout,
            self.client
                .post(format!("{}/v1/chat/completions", self.router_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| ModelError::Timeout)?
        .map_err(|e| ModelError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::BadStatus(response.status().as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::MalformedResponse("empty choices".to_string()))
    }
}
