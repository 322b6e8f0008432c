//! Test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rag_core::{Embedder, Fragment, Generator, RagError, Result, Retriever, SearchFilters};

/// Replays canned responses, then repeats the last one.
pub struct ScriptedGenerator {
    responses: Mutex<Vec<String>>,
    fail: bool,
    pub prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            fail: false,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(RagError::generation("upstream unavailable"));
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            Ok(responses.first().cloned().unwrap_or_default())
        }
    }
}

/// Embeds text as its length; fails for texts containing "embed-fail".
pub struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_query(text).await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("embed-fail") {
            return Err(RagError::embedding("model offline"));
        }
        Ok(vec![text.len() as f32])
    }

    fn dimension(&self) -> usize {
        1
    }
}

/// Serves fixed fragments per query length; fails for unknown keys.
#[derive(Default)]
pub struct KeyedRetriever {
    by_key: HashMap<usize, Vec<Fragment>>,
    default: Option<Vec<Fragment>>,
    calls: AtomicUsize,
    pub limits: Mutex<Vec<usize>>,
}

impl KeyedRetriever {
    /// Always return these fragments.
    pub fn fixed(fragments: Vec<Fragment>) -> Self {
        Self {
            default: Some(fragments),
            ..Default::default()
        }
    }

    /// Return fragments keyed by the length of the query text that was embedded.
    pub fn keyed(entries: Vec<(&str, Vec<Fragment>)>) -> Self {
        Self {
            by_key: entries
                .into_iter()
                .map(|(query, fragments)| (query.len(), fragments))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for KeyedRetriever {
    async fn search(
        &self,
        query: &[f32],
        _filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Fragment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);

        let key = query.first().copied().unwrap_or_default() as usize;
        let fragments = match (self.by_key.get(&key), &self.default) {
            (Some(fragments), _) => fragments.clone(),
            (None, Some(fragments)) => fragments.clone(),
            (None, None) => return Err(RagError::retrieval("index unavailable")),
        };
        Ok(fragments.into_iter().take(limit).collect())
    }
}

pub fn fragments(ids: &[i64]) -> Vec<Fragment> {
    ids.iter()
        .map(|id| Fragment::new(*id, format!("fragment {id} content")))
        .collect()
}
