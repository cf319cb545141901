//! OpenAI-compatible provider (`/chat/completions` and `/embeddings`).
//!
//! Works against the OpenAI API and any gateway that speaks the same wire
//! format; set `base_url` (or `OPENAI_BASE_URL`) to point elsewhere.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, ChatProvider, CompletionConfig, CompletionResponse, EmbeddingProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable for the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable for a custom endpoint.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat and embedding client.
///
/// One HTTP client is built per provider and reused for every call.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenAI API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from settings with environment fallback.
    ///
    /// Reads `api_key` (else `OPENAI_API_KEY`) and `base_url`
    /// (else `OPENAI_BASE_URL`, else the public endpoint).
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .map(str::to_string)
            .or_else(|| std::env::var(OPENAI_BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ProviderError> {
        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(self.credential.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<OpenAiError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

fn chat_body<'a>(messages: &'a [ChatMessage], config: &'a CompletionConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages,
        temperature: config.temperature,
        top_p: config.top_p,
        stream: false,
        response_format: config.json_mode.then_some(ResponseFormat {
            type_: "json_object",
        }),
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let body: ChatResponse = self
            .post("chat/completions", &chat_body(&messages, config))
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        // A missing first choice or empty content yields "", which the
        // output parser then rejects as unparseable.
        let (content, finish_reason) = match body.choices.into_iter().next() {
            Some(choice) => (choice.message.content.unwrap_or_default(), choice.finish_reason),
            None => (String::new(), None),
        };

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model,
            finish_reason,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError> {
        let body: EmbeddingResponse = self
            .post("embeddings", &EmbeddingRequest { model, input: text })
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::ParseError("embedding response has no data".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for OpenAI-compatible providers.
///
/// ## Settings
/// ```json
/// {
///   "api_key": "sk-...",              // Optional, falls back to OPENAI_API_KEY
///   "base_url": "https://..."          // Optional, falls back to OPENAI_BASE_URL
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create_chat(&self, config: &JsonValue) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn create_embedding(
        &self,
        config: &JsonValue,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_body_json_mode() {
        let messages = vec![ChatMessage::user("Gib NUR JSON zurück")];
        let config = CompletionConfig::default();
        let body = serde_json::to_value(chat_body(&messages, &config)).unwrap();

        assert_eq!(body["model"], "gpt-4.1-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!((body["top_p"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_chat_body_without_json_mode() {
        let messages = vec![ChatMessage::user("x")];
        let config = CompletionConfig {
            json_mode: false,
            ..Default::default()
        };
        let body = serde_json::to_value(chat_body(&messages, &config)).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_response_content_missing_is_empty() {
        let raw = r#"{"choices":[{"message":{"content":null},"finish_reason":"stop"}],"model":"m"}"#;
        let body: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(body.choices[0].message.content.is_none());
        assert!(body.usage.is_none());
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let factory = OpenAiProviderFactory;
        let config = serde_json::json!({ "api_key": "test-key", "base_url": "http://localhost:8080/v1/" });
        let provider = factory.create_chat(&config).unwrap();
        assert_eq!(provider.name(), "openai");

        let direct = OpenAiProvider::from_config(&config).unwrap();
        assert_eq!(direct.base_url, "http://localhost:8080/v1");
        assert_eq!(direct.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let factory = OpenAiProviderFactory;
        let config = serde_json::json!({ "api_key": "k", "base_url": "localhost" });
        assert!(factory.validate_config(&config).is_err());
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-proj-super-secret-12345";
        let provider = OpenAiProvider::new(secret);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains(secret), "API key was exposed in Debug output!");
        assert!(debug.contains("[REDACTED]"));
    }
}
