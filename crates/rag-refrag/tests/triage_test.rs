//! Integration tests for the triage pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use rag_core::{
    Collaborators, Embedder, Fragment, Generator, RefragConfig, RefragRequest, Result, Retriever,
    ScoringConfig, SearchFilters, TimeoutConfig, TokenEstimator, NO_DOCUMENTS_ANSWER,
};
use rag_refrag::{
    extract_keywords, partition, Compressor, KeywordScorer, RefragService, TokenBudget,
};

const WORDS: [&str; 6] = ["channel", "goroutine", "select", "mutex", "buffer", "deadlock"];

fn arb_fragment() -> impl Strategy<Value = (Vec<usize>, bool)> {
    (prop::collection::vec(0..WORDS.len(), 0..120), any::<bool>())
}

fn build_fragments(specs: Vec<(Vec<usize>, bool)>) -> Vec<Fragment> {
    specs
        .into_iter()
        .enumerate()
        .map(|(i, (words, with_metadata))| {
            let content: Vec<&str> = words.iter().map(|&w| WORDS[w]).collect();
            let mut fragment = Fragment::new(i as i64, content.join(" "));
            if with_metadata {
                fragment.metadata = Some("{\"source\":\"faq\"}".to_string());
            }
            fragment
        })
        .collect()
}

fn arb_triage_input() -> impl Strategy<Value = (Vec<(Vec<usize>, bool)>, usize)> {
    prop::collection::vec(arb_fragment(), 0..40).prop_flat_map(|specs| {
        let len = specs.len();
        (Just(specs), 0..=len)
    })
}

proptest! {
    #[test]
    fn partition_is_complete_and_ordered((specs, expand_k) in arb_triage_input()) {
        let count = specs.len();
        let compressor = Compressor::from_config(&RefragConfig::default());
        let scorer = KeywordScorer::new(ScoringConfig::default());
        let query = extract_keywords("how does a buffered channel avoid deadlock?");

        let mut candidates = compressor.compress(build_fragments(specs), 16);
        for candidate in candidates.iter_mut() {
            candidate.score = scorer.score_fragment(&query, &candidate.fragment);
        }

        let tiers = partition(candidates, expand_k);

        prop_assert_eq!(tiers.expanded.len(), expand_k);
        prop_assert_eq!(tiers.expanded.len() + tiers.compressed.len(), count);
        prop_assert!(tiers.expanded.iter().all(|c| c.is_expanded));
        prop_assert!(tiers.compressed.iter().all(|c| !c.is_expanded));

        let min_expanded = tiers
            .expanded
            .iter()
            .map(|c| c.score)
            .fold(f64::INFINITY, f64::min);
        let max_compressed = tiers
            .compressed
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(min_expanded >= max_compressed);

        let budget = TokenBudget::measure(&tiers);
        prop_assert!(budget.expanded_tokens <= budget.original_tokens);
    }
}

struct OneEmbedder;

#[async_trait]
impl Embedder for OneEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    fn dimension(&self) -> usize {
        1
    }
}

struct StaticRetriever(Vec<Fragment>);

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, _: &[f32], _: &SearchFilters, limit: usize) -> Result<Vec<Fragment>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("answer".to_string())
    }
}

/// One token per word.
struct WordEstimator;

impl TokenEstimator for WordEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

fn service(fragments: Vec<Fragment>, generator: Arc<CountingGenerator>) -> RefragService {
    RefragService::new(
        Collaborators::new(
            Arc::new(OneEmbedder),
            Arc::new(StaticRetriever(fragments)),
            generator,
        ),
        RefragConfig::default(),
        ScoringConfig::default(),
        TimeoutConfig::default(),
    )
}

#[tokio::test]
async fn zero_candidates_never_generate() {
    let generator = Arc::new(CountingGenerator::default());
    let service = service(Vec::new(), generator.clone());

    let response = service
        .query(&RefragRequest::new("anything at all"))
        .await
        .unwrap();

    assert_eq!(response.answer, NO_DOCUMENTS_ANSWER);
    assert!(response.expanded.is_empty());
    assert!(response.compressed.is_empty());
    assert_eq!(response.metadata["over_fetch_k"], 100);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_estimator_drives_budget() {
    let fragments = vec![
        Fragment::new(1, "one two three four"),
        Fragment::new(2, "five six"),
        Fragment::new(3, "seven"),
    ];
    let generator = Arc::new(CountingGenerator::default());
    let service = service(fragments, generator.clone())
        .with_compressor(Compressor::new(Arc::new(WordEstimator), 32));

    let mut request = RefragRequest::new("numbers");
    request.expand_k = Some(1);
    request.compression_ratio = Some(2);
    let response = service.query(&request).await.unwrap();

    // Equal scores keep retrieval order, so fragment 1 is expanded.
    assert_eq!(response.expanded[0].fragment.id, 1);
    assert_eq!(response.metadata["original_tokens"], 7);
    assert_eq!(response.metadata["total_tokens"], 4);
    // max(1, 2/2) + max(1, 1/2)
    assert_eq!(response.metadata["compressed_tokens"], 2);
    assert_eq!(response.metadata["token_reduction"], "33.3%");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}
