//! Question classification and decomposition.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use rag_core::{guarded, CancelToken, Generator, QueryPlan, QuestionType, Result, TimeoutConfig};

/// Rationale recorded on plans produced by the parse fallback.
pub const FALLBACK_REASONING: &str = "JSON parsing failed, fallback to simple mode";

/// Asks the generation model for a retrieval plan.
pub struct QueryPlanner {
    generator: Arc<dyn Generator>,
    timeouts: TimeoutConfig,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn Generator>, timeouts: TimeoutConfig) -> Self {
        Self {
            generator,
            timeouts,
        }
    }

    /// Plan a question.
    ///
    /// Only a failing generation call is an error. Output that does not
    /// parse as a plan degrades to a single-query simple plan.
    pub async fn plan(&self, question: &str, cancel: &CancelToken) -> Result<QueryPlan> {
        let prompt = planning_prompt(question);

        let response = guarded(
            cancel,
            self.timeouts.generate(),
            "plan",
            self.generator.generate(&prompt),
        )
        .await?;

        let plan = parse_plan(question, &response);
        debug!(
            "Planned {:?} as {} with {} sub-queries",
            question,
            plan.question_type,
            plan.sub_queries.len()
        );
        Ok(plan)
    }
}

/// Wire shape of the planner's JSON answer.
#[derive(Debug, Deserialize)]
struct RawPlan {
    is_simple: bool,
    question_type: QuestionType,
    sub_queries: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// Parse the planner's response, falling back to a simple plan on any
/// schema violation.
pub fn parse_plan(question: &str, response: &str) -> QueryPlan {
    let json = strip_code_fence(response);

    match serde_json::from_str::<RawPlan>(json) {
        Ok(raw) => match validate(raw) {
            Some(plan) => plan,
            None => {
                warn!("Planner returned an inconsistent plan, using simple mode");
                fallback_plan(question)
            }
        },
        Err(e) => {
            warn!("Planner output is not a valid plan ({}), using simple mode", e);
            fallback_plan(question)
        }
    }
}

fn validate(raw: RawPlan) -> Option<QueryPlan> {
    let sub_queries: Vec<String> = raw
        .sub_queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    // A simple plan runs at most one retrieval.
    if raw.is_simple && sub_queries.len() > 1 {
        return None;
    }

    let keywords: BTreeSet<String> = raw
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    Some(QueryPlan {
        is_simple: raw.is_simple,
        question_type: raw.question_type,
        sub_queries,
        keywords,
        reasoning: raw.reasoning,
        degraded: false,
    })
}

/// The plan used whenever the planner's output is unusable.
pub fn fallback_plan(question: &str) -> QueryPlan {
    QueryPlan {
        is_simple: true,
        question_type: QuestionType::Factual,
        sub_queries: vec![question.to_string()],
        keywords: BTreeSet::new(),
        reasoning: FALLBACK_REASONING.to_string(),
        degraded: true,
    }
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Build the planning prompt for a question.
pub fn planning_prompt(question: &str) -> String {
    format!(
        r#"You are a query planning expert. Analyze the user's question and produce a retrieval plan.

# Question types
- factual: a fact lookup ("What is X?", "Who invented Y?")
- comparison: contrasts two or more things ("How does X differ from Y?")
- reasoning: asks why or how ("Why does X happen?", "How do I do Y?")
- multi_aspect: asks for a broad treatment ("Give a detailed overview of X")

# Rules
1. is_simple: true when a single lookup can answer the question.
2. sub_queries: for non-simple questions, 2-4 self-contained sub-questions; empty for simple ones.
3. keywords: 2-5 keywords that help retrieval.
4. reasoning: one sentence explaining the decomposition.

# Examples

Question: What is a channel in Go?
{{
  "is_simple": true,
  "question_type": "factual",
  "sub_queries": [],
  "keywords": ["channel", "Go"],
  "reasoning": "A single definition lookup answers this."
}}

Question: How do Go and Rust differ in concurrent programming?
{{
  "is_simple": false,
  "question_type": "comparison",
  "sub_queries": [
    "How does Go approach concurrent programming?",
    "How does Rust approach concurrent programming?",
    "What are the main differences between Go and Rust concurrency?"
  ],
  "keywords": ["Go", "Rust", "concurrency", "differences"],
  "reasoning": "Each side must be understood before they can be compared."
}}

Question: Why is a write-ahead log needed for crash recovery?
{{
  "is_simple": false,
  "question_type": "reasoning",
  "sub_queries": [
    "What happens to in-flight writes when a database crashes?",
    "How does a write-ahead log record changes?",
    "How is a write-ahead log replayed during recovery?"
  ],
  "keywords": ["write-ahead log", "crash recovery", "durability"],
  "reasoning": "The answer follows from the failure mode and the replay mechanism."
}}

# Your turn

Question: {question}

Return only the JSON object, with no other text."#
    )
}
