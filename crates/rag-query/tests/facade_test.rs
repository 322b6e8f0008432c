//! Integration tests for the orchestration facade.
//!
//! Exercises planner → executor → dedup → selector → generation through the
//! public API with recording collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rag_core::{
    AgenticConfig, Collaborators, Embedder, Fragment, Generator, RagError, Result, Retriever,
    SearchFilters, TimeoutConfig,
};
use rag_query::{AgenticRag, QueryRequest};

/// Answers the planning prompt with a fixed plan and everything else with "answer".
struct PlanGenerator {
    plan: String,
    calls: AtomicUsize,
}

impl PlanGenerator {
    fn new(plan: &str) -> Self {
        Self {
            plan: plan.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for PlanGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("query planning expert") {
            Ok(self.plan.clone())
        } else {
            Ok("answer".to_string())
        }
    }
}

/// Records every embedded text.
#[derive(Default)]
struct RecordingEmbedder {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(vec![1.0])
    }

    fn dimension(&self) -> usize {
        1
    }
}

/// Returns consecutive ids per call; fails the call numbers listed in `fail_on`.
struct CountingRetriever {
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl CountingRetriever {
    fn new(fail_on: Vec<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl Retriever for CountingRetriever {
    async fn search(
        &self,
        _query: &[f32],
        _filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Fragment>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            return Err(RagError::retrieval("shard offline"));
        }
        let base = (call * 100) as i64;
        Ok((0..limit as i64)
            .map(|i| Fragment::new(base + i, format!("round {call} item {i}")))
            .collect())
    }
}

fn facade(
    plan: &str,
    retriever: Arc<CountingRetriever>,
) -> (AgenticRag, Arc<PlanGenerator>, Arc<RecordingEmbedder>) {
    let generator = Arc::new(PlanGenerator::new(plan));
    let embedder = Arc::new(RecordingEmbedder::default());
    let collaborators = Collaborators::new(embedder.clone(), retriever, generator.clone());
    let rag = AgenticRag::new(
        collaborators,
        AgenticConfig::default(),
        TimeoutConfig::default(),
    );
    (rag, generator, embedder)
}

#[tokio::test]
async fn simple_plans_never_fan_out() {
    let plans = [
        r#"{"is_simple": true, "question_type": "factual", "sub_queries": []}"#,
        r#"{"is_simple": true, "question_type": "factual", "sub_queries": ["rephrased"]}"#,
        r#"{"is_simple": true, "question_type": "reasoning", "sub_queries": [], "keywords": ["x"]}"#,
        "not a plan at all",
    ];

    for plan in plans {
        let retriever = Arc::new(CountingRetriever::new(Vec::new()));
        let (rag, generator, embedder) = facade(plan, retriever.clone());

        let response = rag
            .query(&QueryRequest::new("What is a goroutine?"))
            .await
            .unwrap();

        assert_eq!(response.metadata["mode"], "basic_rag", "plan: {plan}");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1, "plan: {plan}");
        // The base path embeds the original question, never a sub-query.
        assert_eq!(
            *embedder.texts.lock().unwrap(),
            vec!["What is a goroutine?".to_string()]
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test]
async fn complex_plan_tolerates_failed_rounds() {
    let plan = r#"{
        "is_simple": false,
        "question_type": "multi_aspect",
        "sub_queries": ["history", "design", "tooling", "community"]
    }"#;
    // The second and fourth retrieval calls fail.
    let retriever = Arc::new(CountingRetriever::new(vec![1, 3]));
    let (rag, _generator, embedder) = facade(plan, retriever.clone());

    let mut request = QueryRequest::new("Tell me everything about Rust");
    request.top_k = Some(10);
    let response = rag.query(&request).await.unwrap();

    assert_eq!(response.metadata["rounds"], 2);
    assert_eq!(response.metadata["total_retrieved"], 10);
    assert_eq!(response.metadata["raw_retrieved"], 10);
    assert_eq!(response.metadata["final_selected"], 10);
    assert_eq!(embedder.texts.lock().unwrap().len(), 4);

    // Only rounds 0 and 2 contribute, in plan order.
    assert!(response
        .sources
        .iter()
        .all(|f| f.id / 100 == 0 || f.id / 100 == 2));
    assert_eq!(response.sources[0].id, 0);
    assert_eq!(response.sources[5].id, 200);
}
