//! Answering pipelines: the single-retrieval base path and the agentic facade.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use rag_core::{
    guarded, AgenticConfig, CancelToken, Collaborators, Fragment, Metadata, QueryPlan,
    QueryRequest, QueryResponse, Reranker, Result, Stage, TimeoutConfig, NO_DOCUMENTS_ANSWER,
};

use crate::dedup::dedup_fragments;
use crate::executor::QueryExecutor;
use crate::planner::QueryPlanner;
use crate::prompt::{Evidence, PromptComposer};
use crate::rerank::{select, RelevanceSelector};

/// Single-round retrieval followed by one generation call.
pub struct BaseRag {
    collaborators: Collaborators,
    composer: PromptComposer,
    config: AgenticConfig,
    timeouts: TimeoutConfig,
}

impl BaseRag {
    pub fn new(collaborators: Collaborators, config: AgenticConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            collaborators,
            composer: PromptComposer::default(),
            config,
            timeouts,
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.query_with_cancel(request, &CancelToken::new()).await
    }

    pub async fn query_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: &CancelToken,
    ) -> Result<QueryResponse> {
        request.validate()?;

        let top_k = request.requested_top_k().unwrap_or(self.config.default_top_k);
        let retrieved = self
            .retrieve(&request.question, request, top_k, cancel)
            .await
            .map_err(|e| e.at_stage(Stage::Execution))?;
        let total_retrieved = retrieved.len();
        let selected = select(retrieved, top_k);

        let mut metadata = Metadata::new();
        metadata.insert("mode".into(), json!("basic_rag"));
        metadata.insert("top_k".into(), json!(top_k));
        metadata.insert("total_retrieved".into(), json!(total_retrieved));
        metadata.insert("final_selected".into(), json!(selected.len()));

        if selected.is_empty() {
            return Ok(no_documents(metadata));
        }

        let evidence: Vec<Evidence<'_>> = selected.iter().map(|f| Evidence::new(&f.content)).collect();
        let prompt = self
            .composer
            .compose(&request.question, None, &evidence);

        let answer = generate(&self.collaborators, self.timeouts, &prompt, cancel).await?;

        Ok(QueryResponse {
            answer,
            sources: selected,
            metadata,
        })
    }

    async fn retrieve(
        &self,
        text: &str,
        request: &QueryRequest,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Fragment>> {
        let vector = guarded(
            cancel,
            self.timeouts.embed(),
            "embed",
            self.collaborators.embedder.embed_query(text),
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
}

/// The orchestration facade.
///
/// Plans the question, sends simple questions down the base path, and
/// otherwise runs the multi-round executor, deduplication and relevance
/// selection before a single generation call.
pub struct AgenticRag {
    collaborators: Collaborators,
    planner: QueryPlanner,
    executor: QueryExecutor,
    selector: RelevanceSelector,
    composer: PromptComposer,
    base: BaseRag,
    config: AgenticConfig,
    timeouts: TimeoutConfig,
}

impl AgenticRag {
    pub fn new(collaborators: Collaborators, config: AgenticConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            planner: QueryPlanner::new(Arc::clone(&collaborators.generator), timeouts),
            executor: QueryExecutor::new(
                Arc::clone(&collaborators.embedder),
                Arc::clone(&collaborators.retriever),
                config.clone(),
                timeouts,
            ),
            selector: RelevanceSelector::default(),
            composer: PromptComposer::default(),
            base: BaseRag::new(collaborators.clone(), config.clone(), timeouts),
            collaborators,
            config,
            timeouts,
        }
    }

    /// Replace the default truncating selector with a reranker.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.selector = RelevanceSelector::new(reranker, self.timeouts);
        self
    }

    /// Plan a question without answering it.
    pub async fn plan(&self, question: &str, cancel: &CancelToken) -> Result<QueryPlan> {
        self.planner
            .plan(question, cancel)
            .await
            .map_err(|e| e.at_stage(Stage::Planning))
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.query_with_cancel(request, &CancelToken::new()).await
    }

    pub async fn query_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: &CancelToken,
    ) -> Result<QueryResponse> {
        request.validate()?;
        let start = Instant::now();

        info!("Answering: {:?}", request.question);

        let plan = self.plan(&request.question, cancel).await?;

        if plan.is_simple {
            debug!("Simple question, taking the base path");
            let mut response = self.base.query_with_cancel(request, cancel).await?;
            annotate_simple(&mut response.metadata, &plan);
            return Ok(response);
        }

        if plan.sub_queries.is_empty() {
            warn!("Planner marked the question complex but gave no sub-queries, taking the base path");
            let mut response = self.base.query_with_cancel(request, cancel).await?;
            annotate_simple(&mut response.metadata, &plan);
            response
                .metadata
                .insert("fallback_reason".into(), json!("empty_sub_queries"));
            return Ok(response);
        }

        let execution = self.executor.execute(&plan, request, cancel).await;
        let raw_retrieved = execution.all_fragments.len();

        let unique = dedup_fragments(execution.all_fragments);
        let unique_count = unique.len();

        let top_k = request.requested_top_k().unwrap_or(self.config.default_top_k);
        let selected = self
            .selector
            .select(&request.question, unique, top_k, cancel)
            .await;

        debug!(
            "Retrieved {} fragments, {} unique, {} selected",
            raw_retrieved,
            unique_count,
            selected.len()
        );

        let mut metadata = Metadata::new();
        metadata.insert("mode".into(), json!("agentic_rag"));
        metadata.insert("is_simple".into(), json!(false));
        metadata.insert("question_type".into(), json!(plan.question_type.as_str()));
        metadata.insert("sub_queries".into(), json!(plan.sub_queries));
        metadata.insert("total_retrieved".into(), json!(unique_count));
        metadata.insert("unique_retrieved".into(), json!(unique_count));
        metadata.insert("raw_retrieved".into(), json!(raw_retrieved));
        metadata.insert("final_selected".into(), json!(selected.len()));
        metadata.insert("rounds".into(), json!(execution.rounds));

        if selected.is_empty() {
            return Ok(no_documents(metadata));
        }

        let evidence: Vec<Evidence<'_>> = selected.iter().map(|f| Evidence::new(&f.content)).collect();
        let prompt = self
            .composer
            .compose(&request.question, Some(&plan), &evidence);

        let answer = generate(&self.collaborators, self.timeouts, &prompt, cancel).await?;

        info!(
            "Answered in {}ms from {} fragments over {} rounds",
            start.elapsed().as_millis(),
            selected.len(),
            execution.rounds
        );

        Ok(QueryResponse {
            answer,
            sources: selected,
            metadata,
        })
    }
}

async fn generate(
    collaborators: &Collaborators,
    timeouts: TimeoutConfig,
    prompt: &str,
    cancel: &CancelToken,
) -> Result<String> {
    guarded(
        cancel,
        timeouts.generate(),
        "generate",
        collaborators.generator.generate(prompt),
    )
    .await
    .map_err(|e| e.at_stage(Stage::Generation))
}

fn no_documents(metadata: Metadata) -> QueryResponse {
    QueryResponse {
        answer: NO_DOCUMENTS_ANSWER.to_string(),
        sources: Vec::new(),
        metadata,
    }
}

fn annotate_simple(metadata: &mut Metadata, plan: &QueryPlan) {
    metadata.insert("is_simple".into(), json!(plan.is_simple));
    metadata.insert("question_type".into(), json!(plan.question_type.as_str()));
    if plan.degraded {
        metadata.insert("planning_fallback".into(), json!(true));
    }
}
