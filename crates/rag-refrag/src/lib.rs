//! rag-refrag - Over-fetch triage for large candidate sets
//!
//! Retrieves far more candidates than the generator will see, scores them
//! cheaply, and splits them into a small expanded tier (shown verbatim) and
//! a compressed tier (shown as excerpts), keeping token statistics along the
//! way.
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_refrag::RefragService;
//! use rag_core::{RefragConfig, RefragRequest, ScoringConfig, TimeoutConfig};
//!
//! let service = RefragService::new(
//!     collaborators,
//!     RefragConfig::default(),
//!     ScoringConfig::default(),
//!     TimeoutConfig::default(),
//! );
//! let response = service.query(&RefragRequest::new("How are goroutines scheduled?")).await?;
//! println!("{} ({})", response.answer, response.metadata["token_reduction"]);
//! ```

mod compress;
mod partition;
mod score;
mod service;

pub use compress::{CharRatioEstimator, Compressor};
pub use partition::{partition, Partition, TokenBudget};
pub use score::{extract_keywords, keyword_overlap, KeywordScorer};
pub use service::{RefragService, TriageParams};
