//! Configuration types for the RAG pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the RAG pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation service configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reranker configuration.
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Multi-round pipeline configuration.
    #[serde(default)]
    pub agentic: AgenticConfig,

    /// Volume triage configuration.
    #[serde(default)]
    pub refrag: RefragConfig,

    /// Heuristic scorer weights.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Per-call deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Which embedder backs query and document embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX model.
    Onnx,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
    /// Deterministic hash vectors (development only).
    Hash,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_path: default_model_path(),
            dimension: 768,
            num_threads: 4,
        }
    }
}

/// OpenAI-compatible generation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// API key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Embedding model name (used when `embedding.provider = "openai"`).
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_llm_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Which reranker orders the deduplicated fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankProvider {
    /// Keep the storage layer's order and truncate.
    None,
    /// BGE-reranker style HTTP service.
    Bge,
    /// Cohere rerank API.
    Cohere,
}

/// Reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_provider")]
    pub provider: RerankProvider,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: RerankProvider::None,
            base_url: None,
            api_key: None,
            model: None,
        }
    }
}

/// Multi-round pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticConfig {
    /// Final result width when the request has no top-K.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Lower bound on a round's width when the request has a top-K.
    #[serde(default = "default_round_width")]
    pub min_round_width: usize,

    /// Round width when the request has no top-K.
    #[serde(default = "default_round_width")]
    pub default_round_width: usize,

    /// Run retrieval rounds concurrently.
    #[serde(default)]
    pub parallel_rounds: bool,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            min_round_width: 3,
            default_round_width: 3,
            parallel_rounds: false,
        }
    }
}

/// Volume triage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefragConfig {
    #[serde(default = "default_over_fetch_k")]
    pub over_fetch_k: usize,

    #[serde(default = "default_expand_k")]
    pub expand_k: usize,

    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: usize,

    /// Components kept in a compressed vector.
    #[serde(default = "default_compressed_dims")]
    pub compressed_dims: usize,

    /// Characters shown per compressed candidate.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Compressed candidates listed individually in the prompt.
    #[serde(default = "default_max_listed_compressed")]
    pub max_listed_compressed: usize,

    /// Characters per token for the length-based estimator.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for RefragConfig {
    fn default() -> Self {
        Self {
            over_fetch_k: 100,
            expand_k: 5,
            compression_ratio: 16,
            compressed_dims: 32,
            excerpt_chars: 50,
            max_listed_compressed: 10,
            chars_per_token: 4,
        }
    }
}

/// Weights for the heuristic candidate scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_score")]
    pub base: f64,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    #[serde(default = "default_shape_weight")]
    pub length_bonus: f64,

    #[serde(default = "default_shape_weight")]
    pub short_penalty: f64,

    #[serde(default = "default_shape_weight")]
    pub metadata_bonus: f64,

    #[serde(default = "default_ideal_min_chars")]
    pub ideal_min_chars: usize,

    #[serde(default = "default_ideal_max_chars")]
    pub ideal_max_chars: usize,

    #[serde(default = "default_short_chars")]
    pub short_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: 0.5,
            keyword_weight: 0.3,
            length_bonus: 0.1,
            short_penalty: 0.1,
            metadata_bonus: 0.1,
            ideal_min_chars: 100,
            ideal_max_chars: 500,
            short_chars: 50,
        }
    }
}

/// Per-call deadlines in milliseconds (0 disables the deadline).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default)]
    pub embed_ms: u64,

    #[serde(default)]
    pub search_ms: u64,

    #[serde(default)]
    pub generate_ms: u64,

    #[serde(default)]
    pub rerank_ms: u64,
}

impl TimeoutConfig {
    pub fn embed(&self) -> Option<Duration> {
        millis(self.embed_ms)
    }

    pub fn search(&self) -> Option<Duration> {
        millis(self.search_ms)
    }

    pub fn generate(&self) -> Option<Duration> {
        millis(self.generate_ms)
    }

    pub fn rerank(&self) -> Option<Duration> {
        millis(self.rerank_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// Default value functions

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Onnx
}

fn default_dimension() -> usize {
    768
}

fn default_num_threads() -> usize {
    4
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_rerank_provider() -> RerankProvider {
    RerankProvider::None
}

fn default_top_k() -> usize {
    5
}

fn default_round_width() -> usize {
    3
}

fn default_over_fetch_k() -> usize {
    100
}

fn default_expand_k() -> usize {
    5
}

fn default_compression_ratio() -> usize {
    16
}

fn default_compressed_dims() -> usize {
    32
}

fn default_excerpt_chars() -> usize {
    50
}

fn default_max_listed_compressed() -> usize {
    10
}

fn default_chars_per_token() -> usize {
    4
}

fn default_base_score() -> f64 {
    0.5
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_shape_weight() -> f64 {
    0.1
}

fn default_ideal_min_chars() -> usize {
    100
}

fn default_ideal_max_chars() -> usize {
    500
}

fn default_short_chars() -> usize {
    50
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentic-rag")
        .join("rag.db")
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentic-rag")
        .join("models")
        .join("nomic-embed-text-v1.5")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| crate::error::RagError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentic-rag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("agentic-rag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.agentic.default_top_k, 5);
        assert_eq!(config.refrag.over_fetch_k, 100);
        assert_eq!(config.refrag.expand_k, 5);
        assert_eq!(config.refrag.compression_ratio, 16);
        assert!(config.timeouts.generate().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml(
            r#"
            [refrag]
            expand_k = 8

            [embedding]
            provider = "hash"
            dimension = 64

            [timeouts]
            generate_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.refrag.expand_k, 8);
        assert_eq!(config.refrag.compression_ratio, 16);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding.num_threads, 4);
        assert_eq!(config.scoring.keyword_weight, 0.3);
        assert_eq!(
            config.timeouts.generate(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = RagConfig::from_toml("[agentic]\ndefault_top_k = \"five\"").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_api_key_prefers_config() {
        let config = LlmConfig {
            api_key: Some("sk-config".to_string()),
            api_key_env: "AGENTIC_RAG_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-config"));
    }
}
