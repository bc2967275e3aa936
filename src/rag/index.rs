//! In-memory vector index for one chatbot's knowledge base
//!
//! Built once from a non-empty set of passages, then read-only. The index
//! keeps the embedder that built it and embeds queries with it, so passage
//! and query vectors always come from the same model.

use crate::embedding::{cosine_similarity, Embedder, EmbeddingError};
use crate::rag::chunker::Passage;
use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Number of passages returned when the caller has no preference
pub const DEFAULT_TOP_K: usize = 3;

/// Passages are embedded in batches of this size
const EMBED_BATCH_SIZE: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// A retrieved passage with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

struct Entry {
    passage: Passage,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<Entry>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("passages", &self.entries.len())
            .field("model", &self.embedder.model_name())
            .field("dimension", &self.embedder.dimension())
            .finish()
    }
}

impl VectorIndex {
    /// Embed every passage and build the index.
    ///
    /// Fails with [`IndexError::EmptyCorpus`] when there are no passages, and
    /// with an embedding error if any batch fails; nothing is kept in either case.
    pub async fn build<I>(passages: I, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = Passage>,
    {
        let passages: Vec<Passage> = passages.into_iter().collect();
        if passages.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let dimension = embedder.dimension();
        let mut entries = Vec::with_capacity(passages.len());

        for batch in passages.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            check_vectors(texts.len(), dimension, &vectors)?;

            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(passage, vector)| Entry { passage, vector }),
            );
        }

        tracing::debug!(
            "Built vector index: {} passages, model {} ({} dims)",
            entries.len(),
            embedder.model_name(),
            dimension
        );

        Ok(Self { entries, embedder })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.entries.iter().map(|e| &e.passage)
    }

    /// Embed `query` and return the `k` most similar passages.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>, IndexError> {
        let query_vector = self.embedder.embed_one(query).await?;
        check_vectors(1, self.embedder.dimension(), std::slice::from_ref(&query_vector))?;
        Ok(self.search_by_vector(&query_vector, k))
    }

    /// Rank stored passages against a query vector.
    ///
    /// Returns `min(k, len)` passages by descending cosine similarity; equal
    /// scores are ordered by ascending passage index.
    pub fn search_by_vector(&self, query_vector: &[f32], k: usize) -> Vec<ScoredPassage> {
        if k == 0 {
            return Vec::new();
        }

        // Min-heap of the best k seen so far; the root is the weakest hit
        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
        for (position, entry) in self.entries.iter().enumerate() {
            let score = cosine_similarity(query_vector, &entry.vector);
            heap.push(Reverse(Ranked {
                score: OrderedFloat(score),
                passage_index: entry.passage.index,
                position,
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
        ranked.sort_by(|a, b| b.cmp(a));

        ranked
            .into_iter()
            .map(|r| ScoredPassage {
                passage: self.entries[r.position].passage.clone(),
                score: r.score.into_inner(),
            })
            .collect()
    }
}

/// Ordering key: higher score ranks higher, then lower passage index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ranked {
    score: OrderedFloat<f32>,
    passage_index: usize,
    position: usize,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.passage_index.cmp(&self.passage_index))
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn check_vectors(expected: usize, dimension: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::EmbeddingFailure(format!(
            "expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::EmbeddingFailure(format!(
            "vector dimension {} does not match model dimension {}",
            bad.len(),
            dimension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn passage(index: usize, text: &str) -> Passage {
        Passage {
            index,
            text: text.to_string(),
            start: 0,
            end: text.chars().count(),
        }
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(16));
        let result = VectorIndex::build(Vec::new(), embedder).await;
        assert_eq!(result.unwrap_err(), IndexError::EmptyCorpus);
    }

    #[tokio::test]
    async fn test_returns_all_when_fewer_than_k() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let index = VectorIndex::build(vec![passage(0, "one"), passage(1, "two")], embedder)
            .await
            .unwrap();

        let hits = index.search("one", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.index, 0);
    }

    #[tokio::test]
    async fn test_ties_break_by_passage_index() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let passages = vec![
            passage(0, "unrelated words"),
            passage(1, "same text"),
            passage(2, "same text"),
            passage(3, "same text"),
        ];
        let index = VectorIndex::build(passages, embedder).await.unwrap();

        let hits = index.search("same text", 2).await.unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.passage.index).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_k_zero() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(8));
        let index = VectorIndex::build(vec![passage(0, "x")], embedder).await.unwrap();
        assert!(index.search("x", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_ranked_ordering() {
        let high = Ranked { score: OrderedFloat(0.9), passage_index: 5, position: 5 };
        let low = Ranked { score: OrderedFloat(0.1), passage_index: 0, position: 0 };
        let tie_early = Ranked { score: OrderedFloat(0.9), passage_index: 1, position: 1 };
        assert!(high > low);
        assert!(tie_early > high);
    }
}
