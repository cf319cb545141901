//! Builds the evaluation service from configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use autocheck_runtime::{
    EvaluationService, EvaluationStore, FileStore, IndexConfig, InferenceOrchestrator,
    MemoryStore, MemoryVectorIndex, ProviderRegistry, QuotaStore, RetrievalAugmenter,
    RpcVectorIndex, RuntimeConfig, StoreConfig, VectorIndex,
};

/// Load configuration, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Wire providers, retrieval and stores into a service.
pub async fn build_service(
    config: &RuntimeConfig,
    registry: &ProviderRegistry,
) -> Result<EvaluationService> {
    let provider = &config.provider;
    registry
        .validate(&provider.provider_type, &provider.settings)
        .with_context(|| format!("Invalid '{}' provider settings", provider.provider_type))?;

    let chat = registry
        .create_chat(&provider.provider_type, &provider.settings)
        .with_context(|| format!("Failed to create '{}' chat provider", provider.provider_type))?;

    let retrieval = build_retrieval(config, registry)?;
    let (quota_store, evaluations) = build_stores(&config.store).await?;
    let orchestrator = InferenceOrchestrator::from_config(chat, retrieval, config);

    let service = EvaluationService::from_config(config, orchestrator, quota_store, evaluations)
        .context("Failed to build request validator")?;
    Ok(service)
}

fn build_retrieval(
    config: &RuntimeConfig,
    registry: &ProviderRegistry,
) -> Result<Option<RetrievalAugmenter>> {
    let index: Arc<dyn VectorIndex> = match &config.retrieval.index {
        IndexConfig::None => {
            tracing::info!("No vector index configured; compliance runs without excerpts");
            return Ok(None);
        }
        IndexConfig::Memory { path } => Arc::new(
            MemoryVectorIndex::from_path(path)
                .with_context(|| format!("Failed to load corpus {}", path.display()))?,
        ),
        IndexConfig::Rpc { url, api_key } => {
            Arc::new(RpcVectorIndex::new(url.clone(), api_key.clone()))
        }
    };

    let provider = &config.provider;
    let embedder = registry
        .create_embedding(&provider.provider_type, &provider.settings)
        .with_context(|| {
            format!(
                "Failed to create '{}' embedding provider",
                provider.provider_type
            )
        })?;

    Ok(Some(RetrievalAugmenter::new(
        embedder,
        index,
        config.retrieval.match_count,
        &config.retrieval.embedding_model,
    )))
}

async fn build_stores(
    config: &StoreConfig,
) -> Result<(Arc<dyn QuotaStore>, Arc<dyn EvaluationStore>)> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store; quota and evaluations are lost on restart");
            let store = Arc::new(MemoryStore::new());
            let quota: Arc<dyn QuotaStore> = store.clone();
            let evaluations: Arc<dyn EvaluationStore> = store;
            Ok((quota, evaluations))
        }
        StoreConfig::File { dir } => {
            let store = Arc::new(
                FileStore::open(dir)
                    .await
                    .with_context(|| format!("Failed to open store at {}", dir.display()))?,
            );
            let quota: Arc<dyn QuotaStore> = store.clone();
            let evaluations: Arc<dyn EvaluationStore> = store;
            Ok((quota, evaluations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(yaml: &str) -> RuntimeConfig {
        RuntimeConfig::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.quota.daily_limit, 3);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/autocheck.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/autocheck.yaml"));
    }

    #[tokio::test]
    async fn test_build_service_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "provider:\n  type: openai\n  settings:\n    api_key: sk-test\nstore:\n  type: file\n  dir: {}\n",
            dir.path().display()
        );

        let result = build_service(&config(&yaml), &ProviderRegistry::with_defaults()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_build_service_with_memory_index() {
        let mut corpus = tempfile::NamedTempFile::new().unwrap();
        writeln!(corpus, r#"{{"text": "Art. 6 DSGVO", "embedding": [1.0, 0.0]}}"#).unwrap();

        let yaml = format!(
            "provider:\n  settings:\n    api_key: sk-test\nretrieval:\n  index:\n    type: memory\n    path: {}\n",
            corpus.path().display()
        );
        let config = config(&yaml);
        let retrieval = build_retrieval(&config, &ProviderRegistry::with_defaults()).unwrap();
        assert_eq!(retrieval.unwrap().match_count(), 8);
    }

    #[tokio::test]
    async fn test_unknown_provider_type() {
        let config = config("provider:\n  type: carrier-pigeon\n");
        let err = build_service(&config, &ProviderRegistry::with_defaults())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[tokio::test]
    async fn test_invalid_base_url_rejected_at_startup() {
        let config = config(
            "provider:\n  type: openai\n  settings:\n    api_key: sk-test\n    base_url: localhost:8080\n",
        );
        let err = build_service(&config, &ProviderRegistry::with_defaults())
            .await
            .err()
            .unwrap();

        assert!(err.to_string().contains("Invalid 'openai' provider settings"));
        assert!(format!("{:#}", err).contains("base_url must start with http:// or https://"));
    }

    #[test]
    fn test_missing_corpus_is_startup_error() {
        let config = config(
            "provider:\n  settings:\n    api_key: sk-test\nretrieval:\n  index:\n    type: memory\n    path: /nonexistent/corpus.jsonl\n",
        );
        assert!(build_retrieval(&config, &ProviderRegistry::with_defaults()).is_err());
    }
}
