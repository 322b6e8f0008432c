//! Candidate compression and token estimation.

use std::sync::Arc;

use rag_core::{Fragment, RefragConfig, ScoredCandidate, TokenEstimator};

/// Estimates tokens as characters divided by a fixed ratio.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }
}

/// Wraps retrieved fragments as unscored triage candidates.
#[derive(Clone)]
pub struct Compressor {
    estimator: Arc<dyn TokenEstimator>,
    compressed_dims: usize,
}

impl Compressor {
    pub fn new(estimator: Arc<dyn TokenEstimator>, compressed_dims: usize) -> Self {
        Self {
            estimator,
            compressed_dims,
        }
    }

    pub fn from_config(config: &RefragConfig) -> Self {
        Self::new(
            Arc::new(CharRatioEstimator::new(config.chars_per_token)),
            config.compressed_dims,
        )
    }

    /// Compress every fragment at `ratio` tokens per compressed token.
    pub fn compress(&self, fragments: Vec<Fragment>, ratio: usize) -> Vec<ScoredCandidate> {
        let ratio = ratio.max(1);
        fragments
            .into_iter()
            .map(|fragment| {
                let token_count = self.estimator.estimate(&fragment.content);
                let compressed_vector = self.compressed_vector(&fragment);
                ScoredCandidate {
                    fragment,
                    compressed_vector,
                    score: 0.0,
                    is_expanded: false,
                    token_count,
                    compressed_token_count: (token_count / ratio).max(1),
                }
            })
            .collect()
    }

    // Prefer a stored summary vector over the leading embedding components.
    fn compressed_vector(&self, fragment: &Fragment) -> Vec<f32> {
        let source = fragment
            .summary_vector
            .as_deref()
            .or(fragment.embedding.as_deref())
            .unwrap_or(&[]);
        source[..source.len().min(self.compressed_dims)].to_vec()
    }
}
