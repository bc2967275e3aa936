//! Embedding Module
//!
//! Maps passages and questions to fixed-length vectors. The process creates a
//! single [`Embedder`] at start-up and every index and query goes through it,
//! so vectors from different models never meet in one index.
//!
//! Backends:
//! - [`EmbeddingEngine`]: FastEmbed (ONNX, local inference), all-MiniLM-L6-v2 by default
//! - [`HashingEmbedder`]: deterministic feature hashing, no model download

mod hashing;

pub use hashing::HashingEmbedder;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default embedding model
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Embedding dimension for AllMiniLML6V2
pub const EMBEDDING_DIMENSION: usize = 384;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),
}

/// Text embedder shared by every chatbot in the process
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the underlying model
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailure("No embedding generated".to_string()))
    }
}

/// Create the process-wide embedder from configuration
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::FastEmbed => {
            let engine = EmbeddingEngine::with_model(&config.model, config.cache_size).await?;
            Ok(Arc::new(engine))
        }
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.hashing_dimension))),
    }
}

/// Resolve a model name to the FastEmbed model and its dimension
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let normalized = name
        .trim()
        .trim_start_matches("sentence-transformers/")
        .to_lowercase();

    match normalized.as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, EMBEDDING_DIMENSION)),
        "all-minilm-l12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        _ => Err(EmbeddingError::UnknownModel(name.to_string())),
    }
}

/// FastEmbed-backed embedding engine
pub struct EmbeddingEngine {
    model: Arc<TextEmbedding>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    model_name: String,
    dimension: usize,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with default model
    pub async fn new() -> Result<Self, EmbeddingError> {
        Self::with_model(DEFAULT_MODEL_NAME, 1000).await
    }

    /// Create a new embedding engine for a named model
    pub async fn with_model(name: &str, cache_size: usize) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = resolve_model(name)?;
        let init_options = InitOptions::new(embedding_model);

        tracing::info!("Loading embedding model {}", name);

        // Model download and ONNX session setup are blocking
        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(init_options))
            .await
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("loader task failed: {}", e)))?
            .map_err(|e| EmbeddingError::ModelUnavailable(e.to_string()))?;

        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            model: Arc::new(model),
            cache: Mutex::new(LruCache::new(cache_size)),
            model_name: name.to_string(),
            dimension,
        })
    }

    /// Get cache statistics
    pub async fn cache_stats(&self) -> (usize, usize) {
        let cache = self.cache.lock().await;
        (cache.len(), cache.cap().get())
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut to_embed = Vec::new();
        let mut to_embed_indices = Vec::new();

        {
            let mut cache = self.cache.lock().await;
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(cached) => results[i] = Some(cached.clone()),
                    None => {
                        to_embed.push(text.clone());
                        to_embed_indices.push(i);
                    }
                }
            }
        }

        if !to_embed.is_empty() {
            let model = Arc::clone(&self.model);
            let batch = to_embed.clone();

            let embeddings = tokio::task::spawn_blocking(move || model.embed(batch, None))
                .await
                .map_err(|e| EmbeddingError::EmbeddingFailure(format!("embedding task failed: {}", e)))?
                .map_err(|e| EmbeddingError::EmbeddingFailure(e.to_string()))?;

            if embeddings.len() != to_embed.len() {
                return Err(EmbeddingError::EmbeddingFailure(format!(
                    "expected {} embeddings, model returned {}",
                    to_embed.len(),
                    embeddings.len()
                )));
            }

            let mut cache = self.cache.lock().await;
            for ((text, idx), embedding) in to_embed
                .into_iter()
                .zip(to_embed_indices)
                .zip(embeddings)
            {
                cache.put(text, embedding.clone());
                results[idx] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|v| v.ok_or_else(|| EmbeddingError::EmbeddingFailure("missing embedding".to_string())))
            .collect()
    }
}

/// Calculate cosine similarity between two embeddings.
/// Mismatched lengths and zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Normalize an embedding vector in place
pub fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in embedding.iter_mut() {
            *val /= norm;
        }
    }
}
