//! Retrieval-augmented context for the compliance prompt.
//!
//! The description is embedded once, the k nearest corpus chunks are fetched,
//! and their texts are joined with blank lines. Retrieval never fails the
//! evaluation: any error degrades to an empty context.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::providers::{EmbeddingProvider, ProviderError};

/// Separator between excerpts in the joined context.
pub const EXCERPT_SEPARATOR: &str = "\n\n";

/// Errors from embedding or similarity search.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Embedding provider returned an empty vector")]
    EmptyEmbedding,

    #[error("Similarity search failed: {0}")]
    Search(String),

    #[error("Corpus unreadable: {0}")]
    Corpus(String),
}

/// One retrieved excerpt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub similarity: Option<f32>,
}

/// Nearest-neighbour search over an indexed corpus.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` chunks, similarity-descending.
    async fn search(&self, embedding: &[f32], k: usize)
        -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Embeds descriptions and fetches grounding excerpts.
pub struct RetrievalAugmenter {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    match_count: usize,
    embedding_model: String,
}

impl RetrievalAugmenter {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        match_count: usize,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            match_count,
            embedding_model: embedding_model.into(),
        }
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Fetch and join excerpts, propagating failures.
    pub async fn try_retrieve(&self, description: &str) -> Result<String, RetrievalError> {
        let embedding = self
            .embedder
            .embed(description, &self.embedding_model)
            .await?;
        if embedding.is_empty() {
            return Err(RetrievalError::EmptyEmbedding);
        }

        let chunks = self.index.search(&embedding, self.match_count).await?;
        Ok(chunks
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(EXCERPT_SEPARATOR))
    }

    /// Fetch and join excerpts; an empty string on any failure.
    pub async fn retrieve(&self, description: &str) -> String {
        match self.try_retrieve(description).await {
            Ok(context) => {
                tracing::debug!(
                    chars = context.len(),
                    k = self.match_count,
                    "Retrieved grounding excerpts"
                );
                context
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed, continuing without excerpts");
                String::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorpusLine {
    text: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    text: String,
    embedding: Vec<f32>,
    norm: f32,
}

/// Cosine-similarity index held in memory.
///
/// Ties keep load order.
#[derive(Debug, Clone, Default)]
pub struct MemoryVectorIndex {
    chunks: Vec<IndexedChunk>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        let norm = l2_norm(&embedding);
        self.chunks.push(IndexedChunk {
            text: text.into(),
            embedding,
            norm,
        });
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Load a JSONL corpus of `{"text": ..., "embedding": [...]}` records.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RetrievalError> {
        let mut index = Self::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RetrievalError::Corpus(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: CorpusLine = serde_json::from_str(&line)
                .map_err(|e| RetrievalError::Corpus(format!("line {}: {}", number + 1, e)))?;
            index.insert(record.text, record.embedding);
        }
        Ok(index)
    }

    pub fn from_path(path: &Path) -> Result<Self, RetrievalError> {
        let file = std::fs::File::open(path)
            .map_err(|e| RetrievalError::Corpus(format!("{}: {}", path.display(), e)))?;
        let index = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(path = %path.display(), chunks = index.len(), "Loaded retrieval corpus");
        Ok(index)
    }

    fn rank(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let query_norm = l2_norm(query);
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter(|c| c.embedding.len() == query.len())
            .map(|c| (cosine(query, query_norm, c), c))
            .collect();

        // Stable sort keeps load order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(score, c)| RetrievedChunk {
                text: c.text.clone(),
                similarity: Some(score),
            })
            .collect()
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, chunk: &IndexedChunk) -> f32 {
    if query_norm == 0.0 || chunk.norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(&chunk.embedding).map(|(a, b)| a * b).sum();
    dot / (query_norm * chunk.norm)
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(self.rank(embedding, k))
    }
}

#[cfg(feature = "rpc-index")]
pub use rpc::RpcVectorIndex;

#[cfg(feature = "rpc-index")]
mod rpc {
    use super::*;
    use crate::providers::ApiCredential;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct MatchRequest<'a> {
        query_embedding: &'a [f32],
        match_count: usize,
        doc_version: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct MatchRow {
        chunk: String,
        #[serde(default)]
        similarity: Option<f32>,
    }

    /// Similarity search behind an HTTP RPC endpoint (`match_doc_chunks`).
    ///
    /// Rows come back similarity-descending; their order is kept.
    pub struct RpcVectorIndex {
        url: String,
        credential: Option<ApiCredential>,
        client: reqwest::Client,
    }

    impl std::fmt::Debug for RpcVectorIndex {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RpcVectorIndex")
                .field("url", &self.url)
                .field("credential", &self.credential)
                .finish()
        }
    }

    impl RpcVectorIndex {
        pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
            Self {
                url: url.into(),
                credential: ApiCredential::optional(api_key.as_deref(), "Vector index key"),
                client: reqwest::Client::new(),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for RpcVectorIndex {
        async fn search(
            &self,
            embedding: &[f32],
            k: usize,
        ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            let mut request = self.client.post(&self.url).json(&MatchRequest {
                query_embedding: embedding,
                match_count: k,
                doc_version: None,
            });
            if let Some(cred) = &self.credential {
                request = request
                    .header("apikey", cred.expose())
                    .bearer_auth(cred.expose());
            }

            let response = request
                .send()
                .await
                .map_err(|e| RetrievalError::Search(e.to_string()))?;
            if !response.status().is_success() {
                return Err(RetrievalError::Search(format!(
                    "status {}",
                    response.status()
                )));
            }

            let rows: Vec<MatchRow> = response
                .json()
                .await
                .map_err(|e| RetrievalError::Search(e.to_string()))?;

            Ok(rows
                .into_iter()
                .take(k)
                .map(|r| RetrievedChunk {
                    text: r.chunk,
                    similarity: r.similarity,
                })
                .collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_match_request_shape() {
            let body = serde_json::to_value(MatchRequest {
                query_embedding: &[0.5, 0.25],
                match_count: 8,
                doc_version: None,
            })
            .unwrap();
            assert_eq!(body["match_count"], 8);
            assert!(body["doc_version"].is_null());
            assert_eq!(body["query_embedding"][1], 0.25);
        }

        #[test]
        fn test_debug_hides_key() {
            let index = RpcVectorIndex::new("http://localhost/rpc", Some("service-key".into()));
            assert!(!format!("{:?}", index).contains("service-key"));
        }
    }
}
