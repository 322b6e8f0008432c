//! Tool server implementation.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use rag_core::{
    CancelToken, Collaborators, Embedder, Fragment, FragmentStore, Generator, NewFragment,
    QueryRequest, RagConfig, RagError, RefragRequest, Reranker, Retriever,
};
use rag_query::AgenticRag;
use rag_refrag::RefragService;

/// Characters of each source shown in human-readable output.
const SOURCE_PREVIEW_CHARS: usize = 120;

/// RAG tool server state.
pub struct RagServer {
    store: Arc<dyn FragmentStore>,
    embedder: Arc<dyn Embedder>,
    agentic: AgenticRag,
    refrag: RefragService,
}

/// Planning request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct PlanParams {
    pub question: String,
}

/// Ingest request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct IngestParams {
    /// Fragments to store. Those without an embedding are embedded first.
    pub fragments: Vec<NewFragment>,
}

/// Tool result.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    /// Whether the operation was successful.
    pub success: bool,

    /// Result message or content.
    pub message: String,

    /// Machine-readable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Structured payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code: Some(code.into()),
            data: None,
        }
    }

    fn from_error(context: &str, err: &RagError) -> Self {
        if err.is_cancelled() {
            warn!("{} cancelled: {}", context, err);
        } else {
            warn!("{} failed: {}", context, err);
        }
        Self::error(format!("{}: {}", context, err), err.error_code())
    }
}

impl RagServer {
    /// Wire a server over one store that serves both reads and writes.
    pub fn new<S>(
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: &RagConfig,
    ) -> Self
    where
        S: FragmentStore + 'static,
    {
        let retriever: Arc<dyn Retriever> = store.clone();
        let collaborators = Collaborators::new(embedder.clone(), retriever, generator);

        info!("Initializing RAG tool server");

        Self {
            store,
            embedder,
            agentic: AgenticRag::new(collaborators.clone(), config.agentic.clone(), config.timeouts),
            refrag: RefragService::new(
                collaborators,
                config.refrag.clone(),
                config.scoring.clone(),
                config.timeouts,
            ),
        }
    }

    /// Order agentic results with `reranker` instead of truncating.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.agentic = self.agentic.with_reranker(reranker);
        self
    }

    /// Get the server info.
    pub fn info() -> ServerInfo {
        ServerInfo {
            name: "agentic-rag".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Multi-round retrieval and context triage over a local fragment store"
                .to_string(),
        }
    }

    /// List available tools.
    pub fn tools() -> Vec<ToolInfo> {
        vec![
            ToolInfo {
                name: "rag_query".to_string(),
                description: "Answer a question with planned multi-round retrieval".to_string(),
            },
            ToolInfo {
                name: "rag_refrag".to_string(),
                description: "Answer a question from a large candidate set, compressing the tail"
                    .to_string(),
            },
            ToolInfo {
                name: "rag_plan".to_string(),
                description: "Show how a question would be decomposed".to_string(),
            },
            ToolInfo {
                name: "rag_ingest".to_string(),
                description: "Embed and store text fragments".to_string(),
            },
            ToolInfo {
                name: "rag_stats".to_string(),
                description: "Get statistics about the fragment store".to_string(),
            },
        ]
    }

    /// Dispatch a tool call by name with JSON arguments.
    pub async fn call(&self, tool: &str, args: Value, cancel: &CancelToken) -> ToolResult {
        match tool {
            "rag_query" => match parse_args::<QueryRequest>(args) {
                Ok(request) => self.query(request, cancel).await,
                Err(result) => result,
            },
            "rag_refrag" => match parse_args::<RefragRequest>(args) {
                Ok(request) => self.refrag(request, cancel).await,
                Err(result) => result,
            },
            "rag_plan" => match parse_args::<PlanParams>(args) {
                Ok(params) => self.plan(params, cancel).await,
                Err(result) => result,
            },
            "rag_ingest" => match parse_args::<IngestParams>(args) {
                Ok(params) => self.ingest(params).await,
                Err(result) => result,
            },
            "rag_stats" => self.stats().await,
            other => ToolResult::error(format!("Unknown tool: {}", other), "UNKNOWN_TOOL"),
        }
    }

    /// Answer a question through the orchestration facade.
    pub async fn query(&self, request: QueryRequest, cancel: &CancelToken) -> ToolResult {
        info!("Query: {:?}", request.question);

        match self.agentic.query_with_cancel(&request, cancel).await {
            Ok(response) => {
                let message = format!("{}{}", response.answer, render_sources(&response.sources));
                match serde_json::to_value(&response) {
                    Ok(data) => ToolResult::success(message, data),
                    Err(e) => ToolResult::from_error("Query", &RagError::from(e)),
                }
            }
            Err(e) => ToolResult::from_error("Query", &e),
        }
    }

    /// Answer a question through volume triage.
    pub async fn refrag(&self, request: RefragRequest, cancel: &CancelToken) -> ToolResult {
        info!("Triage query: {:?}", request.question);

        match self.refrag.query_with_cancel(&request, cancel).await {
            Ok(response) => {
                let reduction = response
                    .metadata
                    .get("token_reduction")
                    .and_then(Value::as_str)
                    .unwrap_or("0.0%");
                let message = format!(
                    "{}\n\n---\nExpanded {} / compressed {} candidates, token reduction {}",
                    response.answer,
                    response.expanded.len(),
                    response.compressed.len(),
                    reduction
                );
                match serde_json::to_value(&response) {
                    Ok(data) => ToolResult::success(message, data),
                    Err(e) => ToolResult::from_error("Triage query", &RagError::from(e)),
                }
            }
            Err(e) => ToolResult::from_error("Triage query", &e),
        }
    }

    /// Plan a question without retrieving.
    pub async fn plan(&self, params: PlanParams, cancel: &CancelToken) -> ToolResult {
        if params.question.trim().is_empty() {
            return ToolResult::from_error(
                "Plan",
                &RagError::invalid_argument("question must not be empty"),
            );
        }

        match self.agentic.plan(&params.question, cancel).await {
            Ok(plan) => {
                let mut output = format!(
                    "Type: {}\nSimple: {}\n",
                    plan.question_type, plan.is_simple
                );
                if plan.degraded {
                    output.push_str("(planner output unparseable, using fallback)\n");
                }
                output.push_str("Sub-queries:\n");
                for (i, sub_query) in plan.sub_queries.iter().enumerate() {
                    output.push_str(&format!("  {}. {}\n", i + 1, sub_query));
                }
                if !plan.keywords.is_empty() {
                    let keywords: Vec<&str> = plan.keywords.iter().map(String::as_str).collect();
                    output.push_str(&format!("Keywords: {}\n", keywords.join(", ")));
                }
                if !plan.reasoning.is_empty() {
                    output.push_str(&format!("Reasoning: {}\n", plan.reasoning));
                }
                ToolResult::success(output, json!(plan))
            }
            Err(e) => ToolResult::from_error("Plan", &e),
        }
    }

    /// Embed fragments lacking a vector and insert everything into the store.
    pub async fn ingest(&self, params: IngestParams) -> ToolResult {
        let mut fragments = params.fragments;
        if fragments.is_empty() {
            return ToolResult::error("No fragments to ingest", "INVALID_ARGUMENT");
        }
        if let Some(pos) = fragments.iter().position(|f| f.content.trim().is_empty()) {
            return ToolResult::error(
                format!("Fragment {} has empty content", pos),
                "INVALID_ARGUMENT",
            );
        }

        info!("Ingesting {} fragments", fragments.len());

        let pending: Vec<usize> = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if !pending.is_empty() {
            let texts: Vec<&str> = pending.iter().map(|&i| fragments[i].content.as_str()).collect();
            let embeddings = match self.embedder.embed_documents(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => return ToolResult::from_error("Embedding", &e),
            };
            if embeddings.len() != pending.len() {
                return ToolResult::error(
                    format!(
                        "Embedder returned {} vectors for {} fragments",
                        embeddings.len(),
                        pending.len()
                    ),
                    "EMBEDDING_ERROR",
                );
            }
            for (i, embedding) in pending.into_iter().zip(embeddings) {
                fragments[i].embedding = Some(embedding);
            }
        }

        match self.store.insert(fragments).await {
            Ok(ids) => ToolResult::success(
                format!("Successfully ingested {} fragments.", ids.len()),
                json!({ "ids": ids }),
            ),
            Err(e) => ToolResult::from_error("Ingest", &e),
        }
    }

    /// Get statistics.
    pub async fn stats(&self) -> ToolResult {
        match self.store.stats().await {
            Ok(stats) => {
                let mut output = String::from("Store statistics:\n\n");
                output.push_str(&format!("- Fragments: {}\n", stats.fragments));
                output.push_str(&format!("- Embedded: {}\n", stats.embedded));
                output.push_str(&format!("- Documents: {}\n", stats.documents));
                output.push_str(&format!(
                    "- Storage: {:.2} MB\n",
                    stats.storage_bytes as f64 / 1024.0 / 1024.0
                ));
                ToolResult::success(output, json!(stats))
            }
            Err(e) => ToolResult::from_error("Stats", &e),
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolResult> {
    serde_json::from_value(args)
        .map_err(|e| ToolResult::error(format!("Invalid arguments: {}", e), "INVALID_ARGUMENT"))
}

fn render_sources(sources: &[Fragment]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut output = String::from("\n\n---\nSources:\n");
    for (i, fragment) in sources.iter().enumerate() {
        let preview: String = fragment.content.chars().take(SOURCE_PREVIEW_CHARS).collect();
        let ellipsis = if fragment.char_len() > SOURCE_PREVIEW_CHARS { "..." } else { "" };
        output.push_str(&format!(
            "[{}] #{} {}{}\n",
            i + 1,
            fragment.id,
            preview.replace('\n', " "),
            ellipsis
        ));
    }
    output
}

/// Server info.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Tool info.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}
