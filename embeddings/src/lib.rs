//! # Embeddings
//!
//! This crate turns text into fixed-dimension vectors and ranks stored
//! vectors against a query for the rule retrieval service.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to unit-length dense vectors
//! - **Aggregation**: Average several query vectors into one
//! - **Similarity Search**: Rank stored vectors by cosine similarity
//! - **Multiple Providers**: Deterministic hashed provider, OpenAI, cached wrapper
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► average()                  │
//! │       │                                  │                      │
//! │       ▼                                  ▼                      │
//! │  Hashed/OpenAI/Cached             SimilarityIndex               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod hashed;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use hashed::HashedProvider;
pub use index::{DEFAULT_MAX_LIMIT, IndexEntry, SimilarityIndex};
pub use provider::{EmbeddingProvider, OpenAIProvider};
pub use similarity::{SimilarityResult, average, cosine_similarity, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Identifier of an entity whose vector is stored in a [`SimilarityIndex`].
pub type EntityId = i64;

/// Identifier of the category an indexed entity belongs to.
pub type CategoryId = i64;

/// Dimension of embeddings (varies by model).
pub const DEFAULT_DIMENSION: usize = 1536; // OpenAI text-embedding-3-small
