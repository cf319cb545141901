//! Provider factories keyed by type name.
//!
//! The binary picks a provider type from configuration and asks the registry
//! for a chat client and an embedding client. Each is built once and shared.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let chat = registry.create_chat("openai", &settings)?;
//! let embedder = registry.create_embedding("openai", &settings)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{ChatProvider, EmbeddingProvider, ProviderError};

/// Builds providers of one type from JSON settings.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier, e.g. `"openai"`.
    fn provider_type(&self) -> &'static str;

    fn create_chat(&self, config: &JsonValue) -> Result<Arc<dyn ChatProvider>, ProviderError>;

    /// Build an embedding client. Not every provider type offers one.
    fn create_embedding(
        &self,
        _config: &JsonValue,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' has no embedding support",
            self.provider_type()
        )))
    }

    /// Reject settings no provider of this type could run with.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    pub fn create_chat(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.factory(provider_type)?.create_chat(config)
    }

    pub fn create_embedding(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        self.factory(provider_type)?.create_embedding(config)
    }

    /// Check settings before any client is built.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Create a registry with all built-in providers registered.
    #[cfg(feature = "openai")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// Create a registry with all built-in providers registered.
    #[cfg(not(feature = "openai"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
