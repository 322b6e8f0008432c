//! rag-query - Planning, multi-round retrieval and answer synthesis
//!
//! This crate turns a question into an answer by planning how to retrieve
//! for it, running one retrieval round per sub-question, merging the
//! rounds and composing a single generation prompt.
//!
//! # Features
//!
//! - Query planning with a strict plan schema and a simple-mode fallback
//! - Sequential or concurrent retrieval rounds that tolerate partial failure
//! - First-seen deduplication and pluggable relevance selection
//! - A single-retrieval base path for simple questions
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::AgenticRag;
//! use rag_core::{AgenticConfig, Collaborators, QueryRequest, TimeoutConfig};
//!
//! let rag = AgenticRag::new(collaborators, AgenticConfig::default(), TimeoutConfig::default());
//! let response = rag.query(&QueryRequest::new("How do Go and Rust differ?")).await?;
//! println!("{}", response.answer);
//! ```

mod dedup;
mod engine;
mod executor;
mod planner;
mod prompt;
mod rerank;

#[cfg(test)]
mod testing;

pub use dedup::dedup_fragments;
pub use engine::{AgenticRag, BaseRag};
pub use executor::QueryExecutor;
pub use planner::{fallback_plan, parse_plan, planning_prompt, QueryPlanner, FALLBACK_REASONING};
pub use prompt::{BackgroundNote, Evidence, PromptComposer};
pub use rerank::{select, RelevanceSelector, TruncateReranker};

// Re-export for convenience
pub use rag_core::{QueryPlan, QueryRequest, QueryResponse};
