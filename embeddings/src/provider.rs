//! Embedding providers.
//!
//! A provider maps text to a unit-length vector of a fixed dimension. The
//! trait is object safe so the retrieval engine can hold any variant behind
//! an `Arc<dyn EmbeddingProvider>`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Embedding;
use crate::cache::CacheStats;
use crate::error::{EmbeddingError, Result};
use crate::similarity::normalize;

/// Trait for embedding providers.
///
/// Implementations must be deterministic for a given text, must return
/// exactly [`EmbeddingProvider::dimension`] components, and must return
/// unit-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the model this provider embeds with.
    fn model(&self) -> &str;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, one per input and in order.
    ///
    /// Either every element succeeds or the call fails with the index of the
    /// first element that did not.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        ensure_batch(texts)?;

        let mut results = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let embedding = self
                .embed(text)
                .await
                .map_err(|source| EmbeddingError::BatchElement {
                    index,
                    source: Box::new(source),
                })?;
            results.push(embedding);
        }
        Ok(results)
    }

    /// Statistics of the cache in front of this provider, if there is one.
    async fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Reject empty text before it reaches a provider.
pub(crate) fn ensure_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "text cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Reject an empty batch before it reaches a provider.
pub(crate) fn ensure_batch(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "texts cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Check the dimension of a raw vector and scale it to unit length.
pub(crate) fn finish(mut embedding: Embedding, dimension: usize) -> Result<Embedding> {
    if embedding.len() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    if !normalize(&mut embedding) {
        return Err(EmbeddingError::Failed(
            "raw vector has zero or non-finite norm".to_string(),
        ));
    }
    Ok(embedding)
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model to embed with.
    model: String,

    /// Requested output dimension.
    dimension: usize,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new() -> Self {
        let model = "text-embedding-3-small".to_string();
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            dimension: native_dimension(&model),
            model,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model. Resets the dimension to the model's native size.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.dimension = native_dimension(&self.model);
        self
    }

    /// Request a reduced output dimension (text-embedding-3 models only).
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Check if an API key is available.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request(&self, input: serde_json::Value, expected: usize) -> Result<Vec<Embedding>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let mut body = serde_json::json!({
            "input": input,
            "model": self.model,
        });
        if self.dimension != native_dimension(&self.model) {
            body["dimensions"] = serde_json::json!(self.dimension);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        if result.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                result.data.len()
            )));
        }
        result.data.sort_by_key(|item| item.index);

        result
            .data
            .into_iter()
            .map(|item| finish(item.embedding, self.dimension))
            .collect()
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Native output size of the known OpenAI embedding models.
fn native_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_text(text)?;
        debug!("Generating embedding with model: {}", self.model);

        let mut embeddings = self.request(serde_json::json!(text), 1).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        ensure_batch(texts)?;
        if let Some(index) = texts.iter().position(String::is_empty) {
            return Err(EmbeddingError::BatchElement {
                index,
                source: Box::new(EmbeddingError::InvalidInput(
                    "text cannot be empty".to_string(),
                )),
            });
        }

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let embeddings = self.request(serde_json::json!(texts), texts.len()).await?;
        info!("Generated {} batch embeddings", embeddings.len());
        Ok(embeddings)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
