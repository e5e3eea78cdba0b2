//! Configuration for the rule retrieval engine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use vector_rules_embeddings::{
    CachedProvider, DEFAULT_DIMENSION, DEFAULT_MAX_LIMIT, EmbeddingCache, EmbeddingProvider,
    HashedProvider, OpenAIProvider,
};

use crate::error::{Result, RetrievalError};

/// Configuration for the rule retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding the rule store snapshot.
    pub data_dir: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Check that the configuration can produce a working engine.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(RetrievalError::Config(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if self.query.max_results == 0 {
            return Err(RetrievalError::Config(
                "max_results must be greater than zero".to_string(),
            ));
        }
        if self.embedding.cache_enabled && self.embedding.cache_max_entries == 0 {
            return Err(RetrievalError::Config(
                "cache_max_entries must be greater than zero when the cache is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(dirs::data_dir().unwrap_or_default().join("vector-rules"))
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Number of components in every embedding.
    pub dimension: usize,

    /// Base URL of the embeddings API.
    pub base_url: Option<String>,

    /// API key for model-backed providers. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Whether to cache embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,
}

impl EmbeddingConfig {
    /// Set the provider type.
    pub fn with_provider(mut self, provider: EmbeddingProviderType) -> Self {
        self.provider = provider;
        self
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Enable or disable the embedding cache.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Build the configured provider.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.provider {
            EmbeddingProviderType::Hashed => {
                let provider = HashedProvider::new(self.dimension);
                if self.cache_enabled {
                    Arc::new(CachedProvider::new(provider, self.cache()))
                } else {
                    Arc::new(provider)
                }
            }
            EmbeddingProviderType::OpenAI => {
                let provider = self.openai_provider()?;
                if self.cache_enabled {
                    Arc::new(CachedProvider::new(provider, self.cache()))
                } else {
                    Arc::new(provider)
                }
            }
        };

        info!(
            "Using {} embedding provider (model: {}, dimension: {})",
            provider.name(),
            provider.model(),
            provider.dimension()
        );
        Ok(provider)
    }

    fn cache(&self) -> EmbeddingCache {
        EmbeddingCache::new(self.cache_max_entries)
    }

    fn openai_provider(&self) -> Result<OpenAIProvider> {
        let mut provider = OpenAIProvider::new();
        if let Some(model) = &self.model {
            provider = provider.with_model(model);
        }
        provider = provider.with_dimension(self.dimension);
        if let Some(url) = &self.base_url {
            provider = provider.with_base_url(url);
        }
        if let Some(key) = &self.api_key {
            provider = provider.with_api_key(key);
        }

        if !provider.is_available() {
            return Err(RetrievalError::Config(
                "the openai provider needs an API key (set OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(provider)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashed,
            model: None,
            dimension: DEFAULT_DIMENSION,
            base_url: None,
            api_key: None,
            cache_enabled: true,
            cache_max_entries: 10000,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Deterministic hash-seeded placeholder vectors.
    Hashed,
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

impl FromStr for EmbeddingProviderType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashed" | "mock" => Ok(Self::Hashed),
            "openai" => Ok(Self::OpenAI),
            other => Err(RetrievalError::Config(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hashed => f.write_str("hashed"),
            Self::OpenAI => f.write_str("openai"),
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Largest number of results a single retrieval may ask for.
    pub max_results: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_LIMIT,
        }
    }
}
