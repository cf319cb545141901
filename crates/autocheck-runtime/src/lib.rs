//! # autocheck-runtime
//!
//! The model-backed half of autocheck: provider clients, retrieval, the
//! concurrent three-task inference pipeline, quota enforcement and the
//! durable stores.
//!
//! Everything deterministic (request validation, output repair and schema
//! checks, reference-day arithmetic) lives in `autocheck-core`. This crate
//! wires those pieces around real I/O.
//!
//! ## Example
//!
//! ```rust,ignore
//! use autocheck_runtime::{
//!     EvaluationService, InferenceOrchestrator, MemoryStore, ProviderRegistry, RuntimeConfig,
//! };
//!
//! let config = RuntimeConfig::from_path("autocheck.yaml".as_ref())?;
//! let chat = ProviderRegistry::with_defaults()
//!     .create_chat(&config.provider.provider_type, &config.provider.settings)?;
//! let store = Arc::new(MemoryStore::new());
//!
//! let service = EvaluationService::from_config(
//!     &config,
//!     InferenceOrchestrator::from_config(chat, None, &config),
//!     store.clone(),
//!     store,
//! )?;
//!
//! let outputs = service.evaluate(Some(&caller), body, Utc::now()).await?;
//! ```

pub mod config;
pub mod identity;
pub mod orchestrator;
pub mod persist;
pub mod prompts;
pub mod providers;
pub mod quota;
pub mod retrieval;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigError, IndexConfig, QuotaAccounting, RuntimeConfig, StoreConfig, CHAT_MODEL_ENV,
};
pub use identity::{bearer_token, Caller, IdentityProvider, StaticTokenIdentity};
pub use orchestrator::{InferenceError, InferenceOrchestrator};
pub use persist::ResultPersister;
pub use prompts::PromptBuilder;
pub use providers::{
    ApiCredential, ChatMessage, ChatProvider, CompletionConfig, CompletionResponse,
    CredentialSource, EmbeddingProvider, ProviderError, ProviderFactory, ProviderRegistry,
    TokenUsage,
};
pub use quota::{QuotaEnforcer, QuotaError, QuotaStatus, QuotaTicket};
pub use retrieval::{MemoryVectorIndex, RetrievalAugmenter, RetrievalError, VectorIndex};
pub use service::{EvaluateError, EvaluationService};
pub use store::{
    EvaluationRecord, EvaluationStore, FileStore, MemoryStore, QuotaStore, StoreError,
};

#[cfg(feature = "rpc-index")]
pub use retrieval::RpcVectorIndex;
