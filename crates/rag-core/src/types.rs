//! Core domain types for the RAG pipeline.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Answer returned when retrieval produced nothing to ground a response on.
pub const NO_DOCUMENTS_ANSWER: &str = "Sorry, no relevant documents were found.";

/// Provenance metadata attached to every response.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A retrieved unit of source content.
///
/// Fragments are created by the storage layer and are read-only to the
/// orchestration pipeline. The identifier is the sole deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable unique identifier.
    pub id: i64,

    /// Text content.
    pub content: String,

    /// Embedding vector, when the store returns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Precomputed compressed representation, when the store provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_vector: Option<Vec<f32>>,

    /// Free-form auxiliary metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    /// Parent document identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,

    /// Document type tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    /// Language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Fragment {
    /// Create a fragment with only an identifier and content.
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            embedding: None,
            summary_vector: None,
            metadata: None,
            document_id: None,
            doc_type: None,
            language: None,
        }
    }

    /// Whether the fragment carries non-empty auxiliary metadata.
    pub fn has_metadata(&self) -> bool {
        self.metadata.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// Content length in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A fragment to be inserted; the store assigns the identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFragment {
    pub content: String,

    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Precomputed compressed representation.
    #[serde(default)]
    pub summary_vector: Option<Vec<f32>>,

    #[serde(default)]
    pub metadata: Option<String>,

    #[serde(default)]
    pub document_id: Option<i64>,

    #[serde(default)]
    pub doc_type: Option<String>,

    #[serde(default)]
    pub language: Option<String>,
}

impl NewFragment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Attach the identifier assigned by the store.
    pub fn into_fragment(self, id: i64) -> Fragment {
        Fragment {
            id,
            content: self.content,
            embedding: self.embedding,
            summary_vector: self.summary_vector,
            metadata: self.metadata,
            document_id: self.document_id,
            doc_type: self.doc_type,
            language: self.language,
        }
    }
}

/// Scalar filters applied by the storage layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub doc_type: Option<String>,

    #[serde(default)]
    pub language: Option<String>,
}

impl SearchFilters {
    /// Whether a fragment satisfies every filter that is set.
    pub fn matches(&self, fragment: &Fragment) -> bool {
        fn check(filter: &Option<String>, value: &Option<String>) -> bool {
            match filter.as_deref().filter(|f| !f.is_empty()) {
                Some(wanted) => value.as_deref() == Some(wanted),
                None => true,
            }
        }

        check(&self.doc_type, &fragment.doc_type) && check(&self.language, &fragment.language)
    }
}

/// Question classification produced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Factual,
    Comparison,
    Reasoning,
    MultiAspect,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Comparison => "comparison",
            Self::Reasoning => "reasoning",
            Self::MultiAspect => "multi_aspect",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The planner's decomposition decision for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Whether the question can be answered with a single retrieval.
    pub is_simple: bool,

    /// Question classification.
    pub question_type: QuestionType,

    /// Ordered sub-questions, one retrieval round each.
    pub sub_queries: Vec<String>,

    /// Auxiliary retrieval keywords.
    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Free-text rationale.
    #[serde(default)]
    pub reasoning: String,

    /// Set when the planner output could not be parsed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Accumulated output of the multi-round executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Fragments from every successful round, in round order.
    pub all_fragments: Vec<Fragment>,

    /// Number of rounds that completed without error.
    pub rounds: usize,
}

/// A triage candidate: a fragment with its derived score and compressed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// The retrieved fragment.
    pub fragment: Fragment,

    /// Short vector standing in for the fragment when compressed.
    pub compressed_vector: Vec<f32>,

    /// Relevance score, assigned once by the scorer.
    pub score: f64,

    /// Whether the candidate landed in the expanded set.
    pub is_expanded: bool,

    /// Estimated token count of the full content.
    pub token_count: usize,

    /// Estimated token count of the compressed form.
    pub compressed_token_count: usize,
}

impl ScoredCandidate {
    /// The first `max_chars` characters of the content, with an ellipsis
    /// when truncated.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let content = &self.fragment.content;
        match content.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.clone(),
        }
    }
}

/// A question for the agentic (or base) pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,

    #[serde(default)]
    pub doc_type: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub top_k: Option<usize>,
}

impl QueryRequest {
    /// Create a request with only a question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Reject requests without a question.
    pub fn validate(&self) -> Result<()> {
        validate_question(&self.question)
    }

    /// The caller's top-K, ignoring zero.
    pub fn requested_top_k(&self) -> Option<usize> {
        self.top_k.filter(|k| *k > 0)
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            doc_type: self.doc_type.clone(),
            language: self.language.clone(),
        }
    }
}

/// A question for the volume-triage pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefragRequest {
    pub question: String,

    #[serde(default)]
    pub doc_type: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    /// Candidates to over-fetch (0 or unset uses the configured default).
    #[serde(default)]
    pub over_fetch_k: Option<usize>,

    /// Candidates to keep verbatim (0 or unset uses the configured default).
    #[serde(default)]
    pub expand_k: Option<usize>,

    /// Tokens folded into one compressed token (0 or unset uses the configured default).
    #[serde(default)]
    pub compression_ratio: Option<usize>,
}

impl RefragRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_question(&self.question)
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            doc_type: self.doc_type.clone(),
            language: self.language.clone(),
        }
    }
}

fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(RagError::invalid_argument("question must not be empty"));
    }
    Ok(())
}

/// Answer plus provenance from the agentic or base pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,

    /// Fragments shown to the generator.
    pub sources: Vec<Fragment>,

    pub metadata: Metadata,
}

/// Answer plus provenance from the volume-triage pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefragResponse {
    pub answer: String,

    /// Candidates included verbatim.
    pub expanded: Vec<ScoredCandidate>,

    /// Candidates included as excerpts only.
    pub compressed: Vec<ScoredCandidate>,

    pub metadata: Metadata,
}

/// Statistics about the fragment store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of fragments.
    pub fragments: u64,

    /// Number of fragments carrying an embedding.
    pub embedded: u64,

    /// Number of distinct documents.
    pub documents: u64,

    /// Storage size in bytes.
    pub storage_bytes: u64,
}
