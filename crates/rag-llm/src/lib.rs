//! rag-llm - Remote model clients for agentic-rag
//!
//! - [`OpenAiClient`]: `/chat/completions` generation and `/embeddings` for
//!   any OpenAI-compatible service, with a DeepSeek preset.
//! - [`HttpReranker`]: BGE-style and Cohere-style `/rerank` services.

mod openai;
mod rerank;

pub use openai::OpenAiClient;
pub use rerank::{HttpReranker, RerankStyle};
