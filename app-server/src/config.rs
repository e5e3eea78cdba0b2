//! Server configuration.
//!
//! Values come from an optional TOML file, then from environment variables,
//! which win over the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use vector_rules_retrieval::{EmbeddingProviderType, RetrievalConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Retrieval engine settings.
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load configuration from `path` (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config
            .retrieval
            .validate()
            .context("invalid retrieval configuration")?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Override settings from environment variables. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("HTTP_PORT") {
            self.server.http_port = port
                .parse()
                .with_context(|| format!("invalid HTTP_PORT: {port}"))?;
        }
        if let Some(dir) = var("VECTOR_RULES_DATA_DIR") {
            self.retrieval.data_dir = PathBuf::from(dir);
        }
        if let Some(provider) = var("EMBEDDING_PROVIDER") {
            self.retrieval.embedding.provider = provider.parse::<EmbeddingProviderType>()?;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.retrieval.embedding.model = Some(model);
        }
        if let Some(dimension) = var("EMBEDDING_DIMENSION") {
            self.retrieval.embedding.dimension = dimension
                .parse()
                .with_context(|| format!("invalid EMBEDDING_DIMENSION: {dimension}"))?;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.retrieval.embedding.api_key = Some(key);
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to listen on.
    pub http_port: u16,
}

impl ServerConfig {
    /// Socket address to listen on.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.http_port);
        addr.parse()
            .with_context(|| format!("invalid listen address {addr}"))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}
