//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Malformed or out-of-range input (empty text, empty batch, bad limit).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider could not produce a usable vector.
    #[error("embedding failed: {0}")]
    Failed(String),

    /// One element of a batch failed; nothing from the batch is returned.
    #[error("embedding failed for batch element {index}: {source}")]
    BatchElement {
        index: usize,
        #[source]
        source: Box<EmbeddingError>,
    },

    /// Dimension mismatch against the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector in a group disagrees with the first vector's dimension.
    #[error("vector {index} has dimension {actual}, expected {expected}")]
    InconsistentDimensions {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether this error describes a disagreement between vector lengths.
    pub fn is_dimension_mismatch(&self) -> bool {
        match self {
            Self::DimensionMismatch { .. } | Self::InconsistentDimensions { .. } => true,
            Self::BatchElement { source, .. } => source.is_dimension_mismatch(),
            _ => false,
        }
    }
}
