//! rag-mcp - Tool server
//!
//! This crate exposes the agentic and triage pipelines as named tools with
//! JSON arguments and uniform results, for AI assistants and the CLI.
//!
//! # Tools
//!
//! - `rag_query` - Answer a question with planned multi-round retrieval
//! - `rag_refrag` - Answer from a large candidate set with compressed background
//! - `rag_plan` - Show the query plan for a question
//! - `rag_ingest` - Embed and store text fragments
//! - `rag_stats` - Get statistics about the fragment store

mod server;

pub use server::{IngestParams, PlanParams, RagServer, ServerInfo, ToolInfo, ToolResult};
