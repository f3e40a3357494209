//! Language-model provider abstraction
//!
//! A small chat-completion interface shared by the patient responder, the
//! case generator, and the evaluator. Collaborators only ever need plain
//! text in and plain text out.

mod error;
mod openai;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for chat-completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| openai::DEFAULT_BASE_URL.to_string());
        Self {
            api_key,
            model,
            base_url,
        }
    }

    /// Build a service when an API key is configured.
    pub fn into_service(self) -> Option<Arc<dyn LlmService>> {
        let api_key = self.api_key?;
        let inner = Arc::new(OpenAIService::new(api_key, self.model, &self.base_url));
        Some(Arc::new(LoggingService::new(inner)))
    }
}

/// Logging wrapper for chat services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = reply.input_tokens,
                    output_tokens = reply.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
