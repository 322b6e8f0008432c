//! HTTP rerank services.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rag_core::{Fragment, RagError, RerankConfig, RerankProvider, Reranker, Result};

const BGE_BASE_URL: &str = "http://localhost:8000";
const COHERE_BASE_URL: &str = "https://api.cohere.ai/v1";
const COHERE_MODEL: &str = "rerank-english-v3.0";

/// Wire dialect of a rerank service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankStyle {
    /// Self-hosted BGE-reranker behind a FastAPI `/rerank` route.
    Bge,
    /// Cohere's hosted rerank API.
    Cohere { api_key: String, model: String },
}

/// Reranker that delegates ordering to a remote `/rerank` endpoint.
pub struct HttpReranker {
    http: reqwest::Client,
    base_url: String,
    style: RerankStyle,
}

#[derive(Serialize)]
struct BgeRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
    top_k: usize,
}

#[derive(Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RankedIndex>,
}

#[derive(Deserialize)]
struct RankedIndex {
    index: usize,
    #[serde(alias = "relevance_score", default)]
    score: f64,
}

impl HttpReranker {
    pub fn bge(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        Self::new(
            base_url.unwrap_or_else(|| BGE_BASE_URL.to_string()),
            RerankStyle::Bge,
            timeout,
        )
    }

    pub fn cohere(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            base_url.unwrap_or_else(|| COHERE_BASE_URL.to_string()),
            RerankStyle::Cohere {
                api_key: api_key.into(),
                model: model.unwrap_or_else(|| COHERE_MODEL.to_string()),
            },
            timeout,
        )
    }

    /// Build from the `[rerank]` config section. Returns `None` when the
    /// provider is `none`.
    pub fn from_config(config: &RerankConfig, timeout: Duration) -> Result<Option<Self>> {
        match config.provider {
            RerankProvider::None => Ok(None),
            RerankProvider::Bge => Self::bge(config.base_url.clone(), timeout).map(Some),
            RerankProvider::Cohere => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| RagError::config("Cohere reranker requires rerank.api_key"))?;
                Self::cohere(api_key, config.base_url.clone(), config.model.clone(), timeout)
                    .map(Some)
            }
        }
    }

    fn new(base_url: String, style: RerankStyle, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            style,
        })
    }

    pub fn style(&self) -> &RerankStyle {
        &self.style
    }

    async fn request(
        &self,
        question: &str,
        documents: Vec<&str>,
        width: usize,
    ) -> Result<RerankResponse> {
        let url = format!("{}/rerank", self.base_url);
        let request = match &self.style {
            RerankStyle::Bge => self.http.post(url).json(&BgeRequest {
                query: question,
                documents,
                top_k: width,
            }),
            RerankStyle::Cohere { api_key, model } => {
                self.http.post(url).bearer_auth(api_key).json(&CohereRequest {
                    model,
                    query: question,
                    documents,
                    top_n: width,
                })
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| RagError::rerank(format!("HTTP error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::rerank(format!("API returned {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| RagError::rerank(format!("JSON parse error: {}", e)))
    }
}

/// Order `fragments` by the service's ranking, dropping out-of-range and
/// repeated indices, keeping at most `width`.
fn apply_ranking(fragments: Vec<Fragment>, ranking: &[RankedIndex], width: usize) -> Vec<Fragment> {
    let mut slots: Vec<Option<Fragment>> = fragments.into_iter().map(Some).collect();
    ranking
        .iter()
        .filter_map(|ranked| slots.get_mut(ranked.index).and_then(Option::take))
        .take(width)
        .collect()
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        question: &str,
        fragments: Vec<Fragment>,
        width: usize,
    ) -> Result<Vec<Fragment>> {
        if fragments.is_empty() || width == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        let response = self.request(question, documents, width).await?;

        if let Some(top) = response.results.first() {
            debug!("Reranked {} fragments, top score {:.3}", fragments.len(), top.score);
        }
        Ok(apply_ranking(fragments, &response.results, width))
    }
}
