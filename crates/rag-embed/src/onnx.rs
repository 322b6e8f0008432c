//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use rag_core::{Embedder, EmbeddingConfig, RagError, Result};

use crate::l2_normalize;

/// Longest input accepted by nomic-embed-text-v1.5.
const MAX_TOKENS: usize = 8192;

/// Document prefix for asymmetric retrieval.
const DOCUMENT_PREFIX: &str = "search_document: ";

/// Query prefix for asymmetric retrieval.
const QUERY_PREFIX: &str = "search_query: ";

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// ONNX-based embedder using nomic-embed-text-v1.5 or a compatible model.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    dimension: usize,

    max_tokens: usize,
}

/// Padded token ids and attention masks for one batch.
struct TokenBatch {
    encodings: Vec<Encoding>,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    seq_len: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from the configured model directory.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let dir = &config.model_path;
        Self::load(
            dir.join(MODEL_FILE),
            dir.join(TOKENIZER_FILE),
            config.dimension,
            config.num_threads,
        )
    }

    /// Create an embedder from explicit model and tokenizer paths.
    pub fn load(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!("Embedder initialized: dim={}, threads={}", dimension, num_threads);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            max_tokens: MAX_TOKENS,
        })
    }

    fn tokenize(&self, texts: &[&str], prefix: &str) -> Result<TokenBatch> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let mut input_ids = vec![0i64; encodings.len() * seq_len];
        let mut attention_mask = vec![0i64; encodings.len() * seq_len];

        for (row, encoding) in encodings.iter().enumerate() {
            let offset = row * seq_len;
            let ids = encoding.get_ids().iter().take(seq_len);
            let mask = encoding.get_attention_mask().iter();
            for (col, (id, m)) in ids.zip(mask).enumerate() {
                input_ids[offset + col] = *id as i64;
                attention_mask[offset + col] = *m as i64;
            }
        }

        Ok(TokenBatch {
            encodings,
            input_ids,
            attention_mask,
            seq_len,
        })
    }

    /// Embed a batch of texts with a given prefix.
    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.tokenize(texts, prefix)?;
        let batch_size = batch.encodings.len();
        debug!("Embedding batch: size={}, seq_len={}", batch_size, batch.seq_len);

        let input_ids = Tensor::from_array((vec![batch_size, batch.seq_len], batch.input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask =
            Tensor::from_array((vec![batch_size, batch.seq_len], batch.attention_mask))
                .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
            .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // Output names differ between exports; take the first.
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let embeddings = match view.ndim() {
            3 => mean_pool(&view, &batch.encodings, batch.seq_len),
            2 => (0..batch_size)
                .map(|i| l2_normalize((0..view.shape()[1]).map(|j| view[[i, j]]).collect()))
                .collect(),
            _ => {
                return Err(RagError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    view.shape()
                )))
            }
        };

        if let Some(first) = embeddings.first() {
            if first.len() != self.dimension {
                return Err(RagError::embedding(format!(
                    "Model produced {} dimensions, configured for {}",
                    first.len(),
                    self.dimension
                )));
            }
        }

        Ok(embeddings)
    }
}

/// Attention-masked mean over the sequence axis of a `[batch, seq, hidden]`
/// tensor, followed by L2 normalization.
fn mean_pool(tensor: &ArrayViewD<'_, f32>, encodings: &[Encoding], seq_len: usize) -> Vec<Vec<f32>> {
    let hidden = tensor.shape()[2];
    let seq_len = seq_len.min(tensor.shape()[1]);

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mut sum = vec![0.0f32; hidden];
            let mut valid = 0usize;

            for (j, mask) in encoding.get_attention_mask().iter().take(seq_len).enumerate() {
                if *mask != 1 {
                    continue;
                }
                valid += 1;
                for (k, slot) in sum.iter_mut().enumerate() {
                    *slot += tensor[[i, j, k]];
                }
            }

            if valid == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Session::run needs exclusive access, so inference stays on this task.
        self.embed_batch(texts, DOCUMENT_PREFIX)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text], QUERY_PREFIX)?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_an_embedding_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_path: dir.path().to_path_buf(),
            ..Default::default()
        };

        match OnnxEmbedder::from_config(&config) {
            Err(err) => assert_eq!(err.error_code(), "EMBEDDING_ERROR"),
            Ok(_) => panic!("loading from an empty directory should fail"),
        }
    }
}
