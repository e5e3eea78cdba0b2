//! Similarity index for nearest-neighbor lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::similarity::{SimilarityResult, find_top_k};
use crate::{CategoryId, Embedding, EntityId};

/// Largest `limit` a query accepts unless configured otherwise.
pub const DEFAULT_MAX_LIMIT: usize = 100;

/// An entry in the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Entity the vector belongs to.
    pub id: EntityId,

    /// Category used for filtered queries.
    pub category: CategoryId,

    /// The embedding vector.
    pub embedding: Embedding,
}

/// An exact k-NN index over entity vectors using cosine similarity.
///
/// Vectors are stored as given. Entries are keyed by entity id, so an upsert
/// replaces the previous vector of that entity in one step.
#[derive(Debug)]
pub struct SimilarityIndex {
    /// Stored entries, ordered by id for deterministic tie-breaking.
    entries: BTreeMap<EntityId, IndexEntry>,

    /// Expected dimension of embeddings.
    dimension: usize,

    /// Upper bound accepted for a query's `limit`.
    max_limit: usize,
}

impl SimilarityIndex {
    /// Create a new similarity index.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dimension,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }

    /// Set the largest accepted query limit.
    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit;
        self
    }

    /// Dimension every stored vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Largest accepted query limit.
    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// Fail unless `embedding` has the configured dimension.
    pub fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Store or replace the vector of an entity.
    ///
    /// Returns the entry that was replaced, if any.
    pub fn upsert(
        &mut self,
        id: EntityId,
        category: CategoryId,
        embedding: Embedding,
    ) -> Result<Option<IndexEntry>> {
        self.check_dimension(&embedding)?;

        let previous = self.entries.insert(
            id,
            IndexEntry {
                id,
                category,
                embedding,
            },
        );
        debug!("Upserted embedding for entity {id} (category {category})");

        Ok(previous)
    }

    /// Remove the vector of an entity. Removing an absent entity is a no-op.
    pub fn remove(&mut self, id: EntityId) -> Option<IndexEntry> {
        self.entries.remove(&id)
    }

    /// Get an entry by entity id.
    pub fn get(&self, id: EntityId) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    /// Check if an entity has a stored vector.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank stored vectors against `query`.
    ///
    /// When `category` is set only entries of that category are candidates;
    /// the filter is applied before ranking, so `limit` is filled from the
    /// category alone. Returns fewer than `limit` results when fewer
    /// candidates exist.
    pub fn query(
        &self,
        query: &[f32],
        category: Option<CategoryId>,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>> {
        if limit == 0 || limit > self.max_limit {
            return Err(EmbeddingError::InvalidInput(format!(
                "limit must be between 1 and {}, got {limit}",
                self.max_limit
            )));
        }
        self.check_dimension(query)?;

        let candidates = self
            .entries
            .values()
            .filter(|entry| category.is_none_or(|c| entry.category == c))
            .map(|entry| (entry.id, entry.embedding.as_slice()));

        let results = find_top_k(query, candidates, limit)?;
        debug!(
            "Similarity query returned {} of at most {limit} results",
            results.len()
        );
        Ok(results)
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        self.entries.clear();
        info!("Cleared similarity index");
    }
}
