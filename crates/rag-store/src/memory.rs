//! In-memory store for tests and development.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use rag_core::{
    Fragment, FragmentStore, NewFragment, Result, Retriever, SearchFilters, StoreStats,
};

use crate::vector::rank;

/// In-memory fragment store.
///
/// Same ranking and filter semantics as [`crate::SqliteStore`], without
/// persistence.
#[derive(Default)]
pub struct MemoryStore {
    fragments: RwLock<Vec<Fragment>>,
    last_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Retriever for MemoryStore {
    async fn search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Fragment>> {
        let fragments = self.fragments.read().await;
        let candidates: Vec<Fragment> = fragments
            .iter()
            .filter(|fragment| filters.matches(fragment))
            .cloned()
            .collect();
        Ok(rank(query, candidates, limit))
    }
}

#[async_trait]
impl FragmentStore for MemoryStore {
    async fn insert(&self, new_fragments: Vec<NewFragment>) -> Result<Vec<i64>> {
        let mut fragments = self.fragments.write().await;
        let ids: Vec<i64> = new_fragments
            .into_iter()
            .map(|fragment| {
                let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
                fragments.push(fragment.into_fragment(id));
                id
            })
            .collect();
        debug!("Inserted {} fragments", ids.len());
        Ok(ids)
    }

    async fn get(&self, id: i64) -> Result<Option<Fragment>> {
        let fragments = self.fragments.read().await;
        Ok(fragments.iter().find(|f| f.id == id).cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let fragments = self.fragments.read().await;
        let mut documents: Vec<i64> = fragments.iter().filter_map(|f| f.document_id).collect();
        documents.sort_unstable();
        documents.dedup();

        Ok(StoreStats {
            fragments: fragments.len() as u64,
            embedded: fragments.iter().filter(|f| f.embedding.is_some()).count() as u64,
            documents: documents.len() as u64,
            storage_bytes: 0,
        })
    }
}
