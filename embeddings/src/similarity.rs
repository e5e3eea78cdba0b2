//! Similarity computation and aggregation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::{Embedding, EntityId};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// Magnitude is ignored, so a query vector that is shorter than unit length
/// (an average of unit vectors) ranks exactly like its normalized form.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// A similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// ID of the matched entity.
    pub id: EntityId,

    /// Cosine similarity to the query.
    pub score: f32,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(id: EntityId, score: f32) -> Self {
        Self { id, score }
    }
}

/// Rank candidates against `query` and keep the best `k`.
///
/// Ordering is by descending score, then by ascending id so that equal
/// scores always come back in the same order.
pub fn find_top_k<'a>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (EntityId, &'a [f32])>,
    k: usize,
) -> Result<Vec<SimilarityResult>> {
    let mut scores: Vec<(Reverse<OrderedFloat<f32>>, EntityId)> = Vec::new();

    for (id, embedding) in candidates {
        let score = cosine_similarity(query, embedding)?;
        scores.push((Reverse(OrderedFloat(score)), id));
    }

    scores.sort_unstable();

    Ok(scores
        .into_iter()
        .take(k)
        .map(|(Reverse(score), id)| SimilarityResult::new(id, score.0))
        .collect())
}

/// Normalize an embedding to unit length.
///
/// Returns `false` and leaves the vector untouched when its norm is zero or
/// not finite.
pub fn normalize(embedding: &mut [f32]) -> bool {
    let magnitude: f64 = embedding
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return false;
    }
    for x in embedding.iter_mut() {
        *x = (f64::from(*x) / magnitude) as f32;
    }
    true
}

/// Compute the component-wise mean of several embeddings.
///
/// The result is not re-normalized.
pub fn average(embeddings: &[Embedding]) -> Result<Embedding> {
    let Some(first) = embeddings.first() else {
        return Err(EmbeddingError::InvalidInput(
            "embeddings cannot be empty".to_string(),
        ));
    };

    let dim = first.len();
    if dim == 0 {
        return Err(EmbeddingError::InvalidInput(
            "embeddings cannot have zero dimensions".to_string(),
        ));
    }
    for (index, e) in embeddings.iter().enumerate() {
        if e.len() != dim {
            return Err(EmbeddingError::InconsistentDimensions {
                index,
                expected: dim,
                actual: e.len(),
            });
        }
    }

    let mut result = vec![0.0f32; dim];
    for embedding in embeddings {
        for (sum, val) in result.iter_mut().zip(embedding) {
            *sum += val;
        }
    }

    let count = embeddings.len() as f32;
    for val in &mut result {
        *val /= count;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_ignores_magnitude() {
        let a = vec![0.5, 0.5];
        let b = vec![2.0, 2.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).is_err());
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        assert!(normalize(&mut v));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0];
        assert!(!normalize(&mut v));
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_average_is_component_mean() {
        let avg = average(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(avg, vec![0.5, 0.5]);
    }

    #[test]
    fn test_average_of_duplicates_is_identity() {
        let v = vec![0.25, -0.5, 0.75];
        let avg = average(&[v.clone(), v.clone()]).unwrap();
        assert_eq!(avg, v);
    }

    #[test]
    fn test_average_names_offending_index() {
        let err = average(&[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::InconsistentDimensions {
                index: 2,
                expected: 2,
                actual: 1
            }
        ));
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn test_average_empty() {
        assert!(matches!(
            average(&[]).unwrap_err(),
            EmbeddingError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_find_top_k() {
        let query = vec![1.0, 0.0, 0.0];
        let a = vec![1.0, 0.0, 0.0]; // similarity 1.0
        let b = vec![0.0, 1.0, 0.0]; // similarity 0.0
        let c = vec![0.7, 0.7, 0.0]; // similarity ~0.7
        let candidates = vec![(1, a.as_slice()), (2, b.as_slice()), (3, c.as_slice())];

        let results = find_top_k(&query, candidates, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[1].id, 3);
    }

    #[test]
    fn test_find_top_k_breaks_ties_by_id() {
        let query = vec![1.0, 0.0];
        let same = vec![1.0, 0.0];
        let candidates = vec![(9, same.as_slice()), (4, same.as_slice()), (6, same.as_slice())];

        let ids: Vec<_> = find_top_k(&query, candidates, 3)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![4, 6, 9]);
    }
}
