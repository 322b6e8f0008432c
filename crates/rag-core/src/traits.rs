//! Core traits defining the interfaces between components.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Fragment, NewFragment, ScoredCandidate, SearchFilters, StoreStats};

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts for storage.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Text generation trait.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for a fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Retrieval gateway over the storage layer.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `limit` fragments ranked by similarity to `query`.
    async fn search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Fragment>>;
}

/// Writable fragment storage.
#[async_trait]
pub trait FragmentStore: Retriever {
    /// Insert fragments, returning their assigned identifiers in order.
    async fn insert(&self, fragments: Vec<NewFragment>) -> Result<Vec<i64>>;

    async fn get(&self, id: i64) -> Result<Option<Fragment>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Orders fragments by relevance and keeps at most `width` of them.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        question: &str,
        fragments: Vec<Fragment>,
        width: usize,
    ) -> Result<Vec<Fragment>>;
}

/// Assigns a relevance score to each triage candidate.
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    /// Scores in the same order as `candidates`.
    async fn score(&self, question: &str, candidates: &[ScoredCandidate]) -> Result<Vec<f64>>;
}

/// Estimates how many model tokens a text occupies.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// The network collaborators every pipeline needs.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
}

impl Collaborators {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            generator,
        }
    }
}
