//! Build concrete collaborators from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use rag_core::{Embedder, EmbeddingProvider, Generator, RagConfig, Result};
use rag_embed::{HashEmbedder, OnnxEmbedder};
use rag_llm::{HttpReranker, OpenAiClient};
use rag_mcp::RagServer;
use rag_store::SqliteStore;

pub fn build_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    let embedding = &config.embedding;
    info!("Embedding provider: {:?}", embedding.provider);

    Ok(match embedding.provider {
        EmbeddingProvider::Onnx => Arc::new(OnnxEmbedder::from_config(embedding)?),
        EmbeddingProvider::OpenAi => Arc::new(OpenAiClient::from_config(
            &config.llm,
            embedding.dimension,
        )?),
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(embedding.dimension)),
    })
}

pub fn build_generator(config: &RagConfig) -> Result<Arc<dyn Generator>> {
    if config.llm.resolve_api_key().is_none() {
        warn!(
            "No API key configured; set llm.api_key or {}",
            config.llm.api_key_env
        );
    }
    let client = OpenAiClient::from_config(&config.llm, config.embedding.dimension)?;
    info!("Generation model: {}", client.model());
    Ok(Arc::new(client))
}

/// Open the store and wire every collaborator into a tool server.
pub fn build_server(config: &RagConfig) -> Result<RagServer> {
    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    let embedder = build_embedder(config)?;
    let generator = build_generator(config)?;

    let server = RagServer::new(store, embedder, generator, config);

    let timeout = Duration::from_secs(config.llm.request_timeout_secs);
    Ok(match HttpReranker::from_config(&config.rerank, timeout)? {
        Some(reranker) => {
            info!("Reranker: {:?}", reranker.style());
            server.with_reranker(Arc::new(reranker))
        }
        None => server,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_config(dir: &std::path::Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.embedding.provider = EmbeddingProvider::Hash;
        config.embedding.dimension = 32;
        config.database.path = dir.join("rag.db");
        config.llm.api_key = Some("test-key".to_string());
        config
    }

    #[tokio::test]
    async fn test_build_server_with_hash_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let config = hash_config(dir.path());

        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);

        let server = build_server(&config).unwrap();
        let stats = server.stats().await;
        assert!(stats.success);
        assert!(dir.path().join("rag.db").exists());
    }

    #[test]
    fn test_cohere_without_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = hash_config(dir.path());
        config.rerank.provider = rag_core::RerankProvider::Cohere;

        match build_server(&config) {
            Err(e) => assert_eq!(e.error_code(), "CONFIG_ERROR"),
            Ok(_) => panic!("cohere reranker without a key should be rejected"),
        }
    }
}
