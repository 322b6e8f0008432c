//! Expand/compress partitioning and token accounting.

use serde::Serialize;

use rag_core::ScoredCandidate;

/// The two triage tiers.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Highest-scoring candidates, kept verbatim.
    pub expanded: Vec<ScoredCandidate>,

    /// Everything else, shown as excerpts.
    pub compressed: Vec<ScoredCandidate>,
}

/// Sort by descending score and expand the first `expand_k`.
///
/// The sort is stable, so equal scores keep retrieval order.
pub fn partition(mut candidates: Vec<ScoredCandidate>, expand_k: usize) -> Partition {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let split = expand_k.min(candidates.len());
    let compressed = candidates.split_off(split);
    let mut expanded = candidates;
    for candidate in &mut expanded {
        candidate.is_expanded = true;
    }

    Partition {
        expanded,
        compressed,
    }
}

/// Token statistics for a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    /// Full token count of every candidate.
    pub original_tokens: usize,

    /// Full token count of the expanded tier.
    pub expanded_tokens: usize,

    /// Compressed token count of the compressed tier.
    pub compressed_tokens: usize,
}

impl TokenBudget {
    pub fn measure(partition: &Partition) -> Self {
        let expanded_tokens = partition.expanded.iter().map(|c| c.token_count).sum();
        let compressed_tokens = partition
            .compressed
            .iter()
            .map(|c| c.compressed_token_count)
            .sum();
        let original_tokens = partition
            .expanded
            .iter()
            .chain(&partition.compressed)
            .map(|c| c.token_count)
            .sum();

        Self {
            original_tokens,
            expanded_tokens,
            compressed_tokens,
        }
    }

    /// Share of the prompt budget taken by compressed candidates, in percent.
    pub fn reduction_percent(&self) -> f64 {
        let total = self.expanded_tokens + self.compressed_tokens;
        if total == 0 {
            return 0.0;
        }
        self.compressed_tokens as f64 / total as f64 * 100.0
    }

    /// `reduction_percent` with one decimal and a percent sign.
    pub fn reduction_label(&self) -> String {
        format!("{:.1}%", self.reduction_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Fragment;

    fn candidate(id: i64, score: f64, tokens: usize, compressed: usize) -> ScoredCandidate {
        ScoredCandidate {
            fragment: Fragment::new(id, format!("fragment {id}")),
            compressed_vector: Vec::new(),
            score,
            is_expanded: false,
            token_count: tokens,
            compressed_token_count: compressed,
        }
    }

    fn ids(candidates: &[ScoredCandidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.fragment.id).collect()
    }

    #[test]
    fn test_partition_by_score() {
        let candidates = vec![
            candidate(1, 0.4, 10, 1),
            candidate(2, 0.9, 10, 1),
            candidate(3, 0.6, 10, 1),
            candidate(4, 0.8, 10, 1),
        ];

        let partition = partition(candidates, 2);
        assert_eq!(ids(&partition.expanded), vec![2, 4]);
        assert_eq!(ids(&partition.compressed), vec![3, 1]);
        assert!(partition.expanded.iter().all(|c| c.is_expanded));
        assert!(partition.compressed.iter().all(|c| !c.is_expanded));
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let candidates = vec![
            candidate(5, 0.5, 1, 1),
            candidate(6, 0.5, 1, 1),
            candidate(7, 0.7, 1, 1),
            candidate(8, 0.5, 1, 1),
        ];

        let partition = partition(candidates, 2);
        assert_eq!(ids(&partition.expanded), vec![7, 5]);
        assert_eq!(ids(&partition.compressed), vec![6, 8]);
    }

    #[test]
    fn test_expand_k_larger_than_list() {
        let partition = partition(vec![candidate(1, 0.5, 1, 1)], 5);
        assert_eq!(partition.expanded.len(), 1);
        assert!(partition.compressed.is_empty());
    }

    #[test]
    fn test_budget() {
        let partition = Partition {
            expanded: vec![candidate(1, 0.9, 100, 6), candidate(2, 0.8, 50, 3)],
            compressed: vec![candidate(3, 0.1, 200, 12), candidate(4, 0.1, 80, 5)],
        };

        let budget = TokenBudget::measure(&partition);
        assert_eq!(budget.expanded_tokens, 150);
        assert_eq!(budget.compressed_tokens, 17);
        assert_eq!(budget.original_tokens, 430);
        assert_eq!(budget.reduction_label(), "10.2%");
    }

    #[test]
    fn test_empty_budget() {
        let budget = TokenBudget::measure(&Partition::default());
        assert_eq!(budget.reduction_percent(), 0.0);
        assert_eq!(budget.reduction_label(), "0.0%");
    }
}
