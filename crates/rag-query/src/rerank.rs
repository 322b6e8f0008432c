//! Relevance selection over deduplicated fragments.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use rag_core::{guarded, CancelToken, Fragment, Reranker, Result, TimeoutConfig};

/// Truncate to `width`, trusting the incoming order.
pub fn select(mut fragments: Vec<Fragment>, width: usize) -> Vec<Fragment> {
    fragments.truncate(width);
    fragments
}

/// Reranker that keeps the storage layer's order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateReranker;

#[async_trait]
impl Reranker for TruncateReranker {
    async fn rerank(
        &self,
        _question: &str,
        fragments: Vec<Fragment>,
        width: usize,
    ) -> Result<Vec<Fragment>> {
        Ok(select(fragments, width))
    }
}

/// Runs a configured reranker and falls back to truncation when it fails.
#[derive(Clone)]
pub struct RelevanceSelector {
    reranker: Arc<dyn Reranker>,
    timeouts: TimeoutConfig,
}

impl Default for RelevanceSelector {
    fn default() -> Self {
        Self::new(Arc::new(TruncateReranker), TimeoutConfig::default())
    }
}

impl RelevanceSelector {
    pub fn new(reranker: Arc<dyn Reranker>, timeouts: TimeoutConfig) -> Self {
        Self { reranker, timeouts }
    }

    /// Return at most `width` fragments ordered by relevance.
    ///
    /// Sets that already fit are returned unchanged without consulting the
    /// reranker. A reranker that returns fewer than `width` fragments is
    /// topped up from the retrieval order.
    pub async fn select(
        &self,
        question: &str,
        fragments: Vec<Fragment>,
        width: usize,
        cancel: &CancelToken,
    ) -> Vec<Fragment> {
        if fragments.len() <= width {
            return fragments;
        }

        let reranked = guarded(
            cancel,
            self.timeouts.rerank(),
            "rerank",
            self.reranker.rerank(question, fragments.clone(), width),
        )
        .await;

        match reranked {
            Ok(ranked) => top_up(ranked, fragments, width),
            Err(e) => {
                warn!("Reranker failed ({}), keeping retrieval order", e);
                select(fragments, width)
            }
        }
    }
}

/// Fill `ranked` up to `width` with unseen fragments from `original`.
fn top_up(mut ranked: Vec<Fragment>, original: Vec<Fragment>, width: usize) -> Vec<Fragment> {
    ranked.truncate(width);
    let target = width.min(original.len());
    if ranked.len() >= target {
        return ranked;
    }

    let mut seen: HashSet<i64> = ranked.iter().map(|f| f.id).collect();
    for fragment in original {
        if ranked.len() >= target {
            break;
        }
        if seen.insert(fragment.id) {
            ranked.push(fragment);
        }
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fragments;
    use proptest::prelude::*;
    use rag_core::RagError;

    struct ReversingReranker;

    #[async_trait]
    impl Reranker for ReversingReranker {
        async fn rerank(
            &self,
            _question: &str,
            mut fragments: Vec<Fragment>,
            width: usize,
        ) -> Result<Vec<Fragment>> {
            fragments.reverse();
            fragments.truncate(width);
            Ok(fragments)
        }
    }

    /// Keeps only the last fragment.
    struct ShortReranker;

    #[async_trait]
    impl Reranker for ShortReranker {
        async fn rerank(
            &self,
            _question: &str,
            mut fragments: Vec<Fragment>,
            _width: usize,
        ) -> Result<Vec<Fragment>> {
            Ok(fragments.pop().into_iter().collect())
        }
    }

    struct BrokenReranker;

    #[async_trait]
    impl Reranker for BrokenReranker {
        async fn rerank(&self, _: &str, _: Vec<Fragment>, _: usize) -> Result<Vec<Fragment>> {
            Err(RagError::rerank("service returned 503"))
        }
    }

    proptest! {
        #[test]
        fn test_select_length(len in 0i64..30, width in 0usize..30) {
            let ids: Vec<i64> = (0..len).collect();
            let selected = select(fragments(&ids), width);
            prop_assert_eq!(selected.len(), (len as usize).min(width));
        }
    }

    #[test]
    fn test_select_keeps_prefix() {
        let selected = select(fragments(&[4, 2, 9, 1]), 2);
        let ids: Vec<i64> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_selector_uses_reranker() {
        let selector = RelevanceSelector::new(Arc::new(ReversingReranker), TimeoutConfig::default());
        let selected = selector
            .select("q", fragments(&[1, 2, 3]), 2, &CancelToken::new())
            .await;
        let ids: Vec<i64> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_selector_skips_reranker_when_set_fits() {
        let selector = RelevanceSelector::new(Arc::new(ReversingReranker), TimeoutConfig::default());
        let selected = selector
            .select("q", fragments(&[1, 2]), 5, &CancelToken::new())
            .await;
        let ids: Vec<i64> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_selector_falls_back_on_error() {
        let selector = RelevanceSelector::new(Arc::new(BrokenReranker), TimeoutConfig::default());
        let selected = selector
            .select("q", fragments(&[1, 2, 3]), 2, &CancelToken::new())
            .await;
        let ids: Vec<i64> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_selector_tops_up_short_rerank() {
        let selector = RelevanceSelector::new(Arc::new(ShortReranker), TimeoutConfig::default());
        let selected = selector
            .select("q", fragments(&[1, 2, 3, 4]), 3, &CancelToken::new())
            .await;
        let ids: Vec<i64> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![4, 1, 2]);
    }
}
