//! rag-core - Core types and traits for the agentic RAG pipeline
//!
//! This crate provides the domain types, collaborator traits, error
//! taxonomy, configuration and cancellation plumbing shared by the
//! planner, executor, triage engine and boundary layers.

pub mod cancel;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use cancel::{guarded, CancelToken};
pub use config::*;
pub use error::{RagError, Result, Stage};
pub use traits::*;
pub use types::*;
