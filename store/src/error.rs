//! Error types for rule persistence.

use thiserror::Error;

use crate::model::RuleId;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the rule store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Rule not found.
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Rule type not found, by name or by id.
    #[error("rule type not found: {0}")]
    RuleTypeNotFound(String),

    /// Another rule type already uses this name.
    #[error("rule type already exists: {0}")]
    DuplicateRuleType(String),

    /// The rule type is still referenced by rules.
    #[error("rule type {name} is still used by {rules} rule(s)")]
    RuleTypeInUse { name: String, rules: usize },

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create storage directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read the snapshot file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write the snapshot file.
    #[error("failed to write file: {0}")]
    WriteFile(String),
}
