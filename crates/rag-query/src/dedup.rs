//! Cross-round fragment deduplication.

use std::collections::HashSet;

use rag_core::Fragment;

/// Keep the first occurrence of each fragment identifier, in arrival order.
pub fn dedup_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut seen: HashSet<i64> = HashSet::with_capacity(fragments.len());
    fragments
        .into_iter()
        .filter(|fragment| seen.insert(fragment.id))
        .collect()
}
