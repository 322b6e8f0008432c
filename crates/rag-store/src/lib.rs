//! rag-store - Fragment storage for agentic-rag
//!
//! This crate provides the retrieval gateway: persistent storage for text
//! fragments and their embeddings in SQLite, plus an in-memory store with
//! the same semantics. Both rank by brute-force cosine similarity after
//! applying document-type and language filters.

mod memory;
mod schema;
mod sqlite;
mod vector;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use vector::cosine_similarity;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
