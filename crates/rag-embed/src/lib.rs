//! rag-embed - Local embedding models
//!
//! This crate provides text embedders that run in-process:
//!
//! - [`OnnxEmbedder`]: ONNX Runtime inference over nomic-embed-text-v1.5 or a
//!   compatible export, with document/query prefixes, attention-masked mean
//!   pooling and L2 normalization.
//! - [`HashEmbedder`]: deterministic feature hashing for development and tests.

mod hash;
mod onnx;

pub use hash::HashEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use rag_core::Embedder;

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
