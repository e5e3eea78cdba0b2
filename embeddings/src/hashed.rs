//! Deterministic placeholder provider.
//!
//! Derives a seed from the lower-cased text and fills the vector from a
//! seeded generator. The output carries no semantic meaning, but it honours
//! the full provider contract (deterministic, unit length, fixed dimension),
//! so it stands in for a model-backed provider in development and tests.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, ensure_text};
use crate::{DEFAULT_DIMENSION, Embedding};

/// Hash-seeded embedding provider.
#[derive(Debug, Clone)]
pub struct HashedProvider {
    dimension: usize,
}

impl HashedProvider {
    /// Create a provider producing `dimension`-sized vectors.
    ///
    /// A dimension of zero falls back to [`DEFAULT_DIMENSION`].
    pub fn new(dimension: usize) -> Self {
        let dimension = if dimension == 0 {
            DEFAULT_DIMENSION
        } else {
            dimension
        };
        Self { dimension }
    }

    /// Compute the embedding synchronously.
    pub fn embed_text(&self, text: &str) -> Result<Embedding> {
        ensure_text(text)?;

        let mut rng = StdRng::seed_from_u64(seed_for(text));
        let raw: Vec<f64> = (0..self.dimension)
            .map(|_| rng.random_range(-1.0..=1.0))
            .collect();

        let norm = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(EmbeddingError::Failed(format!(
                "generated vector has degenerate norm {norm}"
            )));
        }

        Ok(raw.into_iter().map(|v| (v / norm) as f32).collect())
    }
}

impl Default for HashedProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

/// Stable seed for a text: the first eight bytes of SHA-256 of its lower-cased form.
fn seed_for(text: &str) -> u64 {
    let digest = Sha256::digest(text.to_lowercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn name(&self) -> &str {
        "hashed"
    }

    fn model(&self) -> &str {
        "sha256-seeded"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn norm(v: &[f32]) -> f64 {
        v.iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn test_unit_length_and_dimension() {
        let provider = HashedProvider::new(1536);
        let long = "long ".repeat(500);
        for text in ["a", "no tabs in yaml", "Ünïcödé ✓", long.as_str()] {
            let embedding = provider.embed_text(text).unwrap();
            assert_eq!(embedding.len(), 1536);
            assert!((norm(&embedding) - 1.0).abs() < 1e-6, "norm off for {text:?}");
        }
    }

    #[test]
    fn test_deterministic() {
        let provider = HashedProvider::new(64);
        let first = provider.embed_text("prefer composition").unwrap();
        let second = provider.embed_text("prefer composition").unwrap();
        assert_eq!(first, second);

        let other_instance = HashedProvider::new(64);
        assert_eq!(first, other_instance.embed_text("prefer composition").unwrap());
    }

    #[test]
    fn test_case_insensitive() {
        let provider = HashedProvider::new(32);
        assert_eq!(
            provider.embed_text("Hello World").unwrap(),
            provider.embed_text("hello world").unwrap()
        );
    }

    #[test]
    fn test_anagrams_differ() {
        let provider = HashedProvider::new(32);
        assert_ne!(
            provider.embed_text("abc").unwrap(),
            provider.embed_text("cba").unwrap()
        );
    }

    #[test]
    fn test_zero_dimension_uses_default() {
        assert_eq!(HashedProvider::new(0).dimension(), DEFAULT_DIMENSION);
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid() {
        let provider = HashedProvider::new(8);
        assert!(matches!(
            provider.embed("").await.unwrap_err(),
            EmbeddingError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_batch_is_index_aligned() {
        let provider = HashedProvider::new(16);
        let texts = vec!["one".to_string(), "two".to_string(), "one".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], provider.embed_text("one").unwrap());
        assert_eq!(batch[1], provider.embed_text("two").unwrap());
        assert_eq!(batch[0], batch[2]);
    }

    #[tokio::test]
    async fn test_batch_reports_first_failing_index() {
        let provider = HashedProvider::new(16);
        let texts = vec!["ok".to_string(), String::new(), String::new()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::BatchElement { index: 1, .. }));

        assert!(matches!(
            provider.embed_batch(&[]).await.unwrap_err(),
            EmbeddingError::InvalidInput(_)
        ));
    }
}
