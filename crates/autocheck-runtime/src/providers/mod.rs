//! Model provider abstractions for autocheck-runtime.
//!
//! Two capabilities are consumed by the pipeline: chat-style generation and
//! text embedding. Each is a trait so a single client can be constructed once,
//! shared by handle, and swapped for an in-process mock in tests.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Default chat model for every task.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1-mini";

/// Default embedding model for retrieval.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Errors from model providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transport-class failures that may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Parameters for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub model: String,

    /// Sampling temperature (low for near-deterministic replies)
    pub temperature: f32,

    /// Nucleus sampling parameter
    pub top_p: f32,

    /// Request a JSON object response
    pub json_mode: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.1,
            top_p: 0.95,
            json_mode: true,
        }
    }
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system" or "user"
    pub role: String,

    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Generated text, empty when the provider returned no content
    pub content: String,

    pub usage: TokenUsage,

    /// Model that served the call
    pub model: String,

    pub finish_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Chat-style text generation.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Execute a non-streaming chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Text embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text into one vector.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError>;

    fn name(&self) -> &str;
}
