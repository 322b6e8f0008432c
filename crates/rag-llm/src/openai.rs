//! OpenAI-compatible chat and embedding client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rag_core::{Embedder, Generator, LlmConfig, RagError, Result};

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Client for any service speaking the OpenAI `/chat/completions` and
/// `/embeddings` protocol.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        })
    }

    /// Build from the `[llm]` config section. `dimension` is the embedding
    /// width reported through [`Embedder::dimension`].
    pub fn from_config(config: &LlmConfig, dimension: usize) -> Result<Self> {
        Ok(Self::new(
            &config.base_url,
            config.resolve_api_key(),
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_embedding_model(&config.embedding_model, dimension))
    }

    /// DeepSeek's hosted endpoint. It has no embedding model.
    pub fn deepseek(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(DEEPSEEK_BASE_URL, Some(api_key.into()), DEEPSEEK_MODEL, timeout)
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, String>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .post(path)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("JSON parse error: {}", e))
    }
}

fn first_choice(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RagError::generation("No choices in response"))
}

fn ordered_embeddings(response: EmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(RagError::embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Chat completion: model={}, prompt_chars={}", self.model, prompt.chars().count());
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .send("/chat/completions", &request)
            .await
            .map_err(RagError::generation)?;
        first_choice(response)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let response: EmbedResponse = self
            .send("/embeddings", &request)
            .await
            .map_err(RagError::embedding)?;
        ordered_embeddings(response, texts.len())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding data in response"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "deepseek-chat",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"answer"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "answer");
    }

    #[test]
    fn test_empty_choices_is_generation_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = first_choice(response).unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");

        let response: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(first_choice(response).is_err());
    }

    #[test]
    fn test_embeddings_follow_index() {
        let response: EmbedResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
        )
        .unwrap();
        assert_eq!(ordered_embeddings(response, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_missing_embeddings_is_embedding_error() {
        let response: EmbedResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        let err = ordered_embeddings(response, 1).unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }

    #[test]
    fn test_deepseek_preset() {
        let client = OpenAiClient::deepseek("sk-test", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, DEEPSEEK_BASE_URL);
        assert_eq!(client.model(), DEEPSEEK_MODEL);
        assert_eq!(client.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = LlmConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let client = OpenAiClient::from_config(&config, 384).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
        assert_eq!(client.dimension(), 384);
        assert_eq!(client.embedding_model, config.embedding_model);
    }
}
