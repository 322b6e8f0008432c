//! The over-fetch triage pipeline.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info};

use rag_core::{
    guarded, CancelToken, CandidateScorer, Collaborators, Fragment, Metadata, RagError,
    RefragConfig, RefragRequest, RefragResponse, Result, ScoredCandidate, ScoringConfig, Stage,
    TimeoutConfig, NO_DOCUMENTS_ANSWER,
};
use rag_query::{BackgroundNote, Evidence, PromptComposer};

use crate::compress::Compressor;
use crate::partition::{partition, Partition, TokenBudget};
use crate::score::KeywordScorer;

/// Effective triage parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriageParams {
    pub over_fetch_k: usize,
    pub expand_k: usize,
    pub compression_ratio: usize,
}

impl TriageParams {
    /// Request values, with zero or unset replaced by the configured defaults.
    pub fn resolve(request: &RefragRequest, config: &RefragConfig) -> Self {
        fn pick(value: Option<usize>, default: usize) -> usize {
            value.filter(|v| *v > 0).unwrap_or(default)
        }

        Self {
            over_fetch_k: pick(request.over_fetch_k, config.over_fetch_k),
            expand_k: pick(request.expand_k, config.expand_k),
            compression_ratio: pick(request.compression_ratio, config.compression_ratio),
        }
    }
}

/// Over-fetches candidates, scores them and shows only the best verbatim.
pub struct RefragService {
    collaborators: Collaborators,
    scorer: Arc<dyn CandidateScorer>,
    compressor: Compressor,
    composer: PromptComposer,
    config: RefragConfig,
    timeouts: TimeoutConfig,
}

impl RefragService {
    pub fn new(
        collaborators: Collaborators,
        config: RefragConfig,
        scoring: ScoringConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            collaborators,
            scorer: Arc::new(KeywordScorer::new(scoring)),
            compressor: Compressor::from_config(&config),
            composer: PromptComposer::new(config.max_listed_compressed),
            config,
            timeouts,
        }
    }

    /// Replace the heuristic scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn CandidateScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the compressor, e.g. to plug in a real tokenizer.
    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub async fn query(&self, request: &RefragRequest) -> Result<RefragResponse> {
        self.query_with_cancel(request, &CancelToken::new()).await
    }

    pub async fn query_with_cancel(
        &self,
        request: &RefragRequest,
        cancel: &CancelToken,
    ) -> Result<RefragResponse> {
        request.validate()?;
        let start = Instant::now();
        let params = TriageParams::resolve(request, &self.config);

        info!(
            "Triage for {:?} (over_fetch_k={}, expand_k={}, ratio={})",
            request.question, params.over_fetch_k, params.expand_k, params.compression_ratio
        );

        let fragments = self
            .over_fetch(request, params.over_fetch_k, cancel)
            .await
            .map_err(|e| e.at_stage(Stage::Retrieval))?;

        if fragments.is_empty() {
            let mut metadata = Metadata::new();
            metadata.insert("chunks_found".into(), json!(0));
            metadata.insert("over_fetch_k".into(), json!(params.over_fetch_k));
            return Ok(RefragResponse {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                expanded: Vec::new(),
                compressed: Vec::new(),
                metadata,
            });
        }
        let chunks_found = fragments.len();

        let mut candidates = self.compressor.compress(fragments, params.compression_ratio);
        self.score(&request.question, &mut candidates)
            .await
            .map_err(|e| e.at_stage(Stage::Scoring))?;

        let tiers = partition(candidates, params.expand_k);
        let budget = TokenBudget::measure(&tiers);
        debug!(
            "Partitioned {} candidates into {} expanded, {} compressed",
            chunks_found,
            tiers.expanded.len(),
            tiers.compressed.len()
        );

        let prompt = self.compose(&request.question, &tiers);
        let answer = guarded(
            cancel,
            self.timeouts.generate(),
            "generate",
            self.collaborators.generator.generate(&prompt),
        )
        .await
        .map_err(|e| e.at_stage(Stage::Generation))?;

        let mut metadata = Metadata::new();
        metadata.insert("chunks_found".into(), json!(chunks_found));
        metadata.insert("expanded_count".into(), json!(tiers.expanded.len()));
        metadata.insert("compressed_count".into(), json!(tiers.compressed.len()));
        metadata.insert("over_fetch_k".into(), json!(params.over_fetch_k));
        metadata.insert("expand_k".into(), json!(params.expand_k));
        metadata.insert("compression_ratio".into(), json!(params.compression_ratio));
        metadata.insert("original_tokens".into(), json!(budget.original_tokens));
        metadata.insert("total_tokens".into(), json!(budget.expanded_tokens));
        metadata.insert("compressed_tokens".into(), json!(budget.compressed_tokens));
        metadata.insert("token_reduction".into(), json!(budget.reduction_label()));

        info!(
            "Triage answered in {}ms ({} token reduction)",
            start.elapsed().as_millis(),
            budget.reduction_label()
        );

        Ok(RefragResponse {
            answer,
            expanded: tiers.expanded,
            compressed: tiers.compressed,
            metadata,
        })
    }

    async fn over_fetch(
        &self,
        request: &RefragRequest,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Fragment>> {
        let vector = guarded(
            cancel,
            self.timeouts.embed(),
            "embed",
            self.collaborators.embedder.embed_query(&request.question),
        )
        .await?;

        guarded(
            cancel,
            self.timeouts.search(),
            "search",
            self.collaborators
                .retriever
                .search(&vector, &request.filters(), limit),
        )
        .await
    }

    async fn score(&self, question: &str, candidates: &mut [ScoredCandidate]) -> Result<()> {
        let scores = self.scorer.score(question, candidates).await?;
        if scores.len() != candidates.len() {
            return Err(RagError::scoring(format!(
                "scorer returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.score = score;
        }
        Ok(())
    }

    fn compose(&self, question: &str, tiers: &Partition) -> String {
        let evidence: Vec<Evidence<'_>> = tiers
            .expanded
            .iter()
            .map(|c| Evidence::scored(&c.fragment.content, c.score))
            .collect();
        let background: Vec<BackgroundNote> = tiers
            .compressed
            .iter()
            .map(|c| BackgroundNote {
                excerpt: c.excerpt(self.config.excerpt_chars),
                score: c.score,
            })
            .collect();

        self.composer.compose_tiered(question, &evidence, &background)
    }
}
