//! Error types for the rule retrieval engine.

use thiserror::Error;
use vector_rules_embeddings::EmbeddingError;
use vector_rules_store::{RuleId, StoreError};

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The request was malformed or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Rule not found.
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Rule type not found.
    #[error("rule type not found: {0}")]
    RuleTypeNotFound(String),

    /// A uniquely named entity already exists.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// The operation conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The embedding provider failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[source] EmbeddingError),

    /// A vector does not have the expected number of components.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The rule store could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The caller cancelled the operation before it committed.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        if err.is_dimension_mismatch() {
            return Self::DimensionMismatch(err.to_string());
        }
        match err {
            EmbeddingError::InvalidInput(message) => Self::InvalidInput(message),
            EmbeddingError::BatchElement { index, source }
                if matches!(*source, EmbeddingError::InvalidInput(_)) =>
            {
                Self::InvalidInput(format!("query {index}: {source}"))
            }
            EmbeddingError::ProviderNotConfigured => {
                Self::Config(EmbeddingError::ProviderNotConfigured.to_string())
            }
            other => Self::EmbeddingFailed(other),
        }
    }
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RuleNotFound(id) => Self::RuleNotFound(id),
            StoreError::RuleTypeNotFound(name) => Self::RuleTypeNotFound(name),
            StoreError::DuplicateRuleType(name) => {
                Self::DuplicateEntry(format!("rule type already exists: {name}"))
            }
            StoreError::RuleTypeInUse { .. } => Self::Conflict(err.to_string()),
            StoreError::Storage(_) | StoreError::Serialization(_) => {
                Self::StorageUnavailable(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_errors_map_to_kinds() {
        let err: RetrievalError = EmbeddingError::InvalidInput("empty".to_string()).into();
        assert!(matches!(err, RetrievalError::InvalidInput(_)));

        let err: RetrievalError = EmbeddingError::InconsistentDimensions {
            index: 1,
            expected: 3,
            actual: 2,
        }
        .into();
        assert!(matches!(err, RetrievalError::DimensionMismatch(_)));

        let err: RetrievalError = EmbeddingError::BatchElement {
            index: 2,
            source: Box::new(EmbeddingError::InvalidInput("empty".to_string())),
        }
        .into();
        assert!(matches!(err, RetrievalError::InvalidInput(_)));

        let err: RetrievalError = EmbeddingError::Failed("zero norm".to_string()).into();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
    }

    #[test]
    fn test_store_errors_map_to_kinds() {
        let err: RetrievalError = StoreError::RuleNotFound(3).into();
        assert!(matches!(err, RetrievalError::RuleNotFound(3)));

        let err: RetrievalError = StoreError::DuplicateRuleType("style".to_string()).into();
        assert!(matches!(err, RetrievalError::DuplicateEntry(_)));

        let err: RetrievalError = StoreError::RuleTypeInUse {
            name: "style".to_string(),
            rules: 2,
        }
        .into();
        assert!(matches!(err, RetrievalError::Conflict(_)));
    }
}
