//! Embedding cache for repeated texts.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, ensure_batch};

/// Bounded least-recently-used cache of embeddings keyed by model and text.
pub struct EmbeddingCache {
    /// In-memory cache.
    cache: Mutex<LruCache<String, Embedding>>,

    /// Maximum cache size.
    max_entries: usize,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a new in-memory cache. A capacity of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            max_entries: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compute a hash for cache lookup.
    fn hash_key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = Self::hash_key(text, model);
        let found = self.cache.lock().await.get(&key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Put an embedding in the cache, evicting the least recently used entry
    /// when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        let key = Self::hash_key(text, model);
        self.cache.lock().await.put(key, embedding);
        debug!("Cached embedding for text (model: {model})");
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        let key = Self::hash_key(text, model);
        self.cache.lock().await.contains(&key)
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.lock().await.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to reach the provider.
    pub misses: u64,
}

/// A provider wrapper that serves repeated texts from an [`EmbeddingCache`].
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Get the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn model(&self) -> &str {
        self.provider.model()
    }

    fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let model = self.provider.model();
        if let Some(embedding) = self.cache.get(text, model).await {
            debug!("Cache hit for embedding");
            return Ok(embedding);
        }

        let embedding = self.provider.embed(text).await?;
        self.cache.put(text, model, embedding.clone()).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        ensure_batch(texts)?;
        let model = self.provider.model();

        let mut cached = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            let hit = self.cache.get(text, model).await;
            if hit.is_none() {
                missing.push(index);
            }
            cached.push(hit);
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|i| texts[*i].clone()).collect();
            let fresh = self
                .provider
                .embed_batch(&to_embed)
                .await
                .map_err(|err| remap_batch_index(err, &missing))?;
            if fresh.len() != missing.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "provider returned {} embeddings for {} texts",
                    fresh.len(),
                    missing.len()
                )));
            }
            for (index, embedding) in missing.into_iter().zip(fresh) {
                self.cache.put(&texts[index], model, embedding.clone()).await;
                cached[index] = Some(embedding);
            }
        }

        Ok(cached.into_iter().flatten().collect())
    }

    async fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats().await)
    }
}

/// Translate a batch index reported for the uncached subset back to the
/// caller's index.
fn remap_batch_index(err: EmbeddingError, missing: &[usize]) -> EmbeddingError {
    match err {
        EmbeddingError::BatchElement { index, source } => {
            EmbeddingError::BatchElement {
                index: missing.get(index).copied().unwrap_or(index),
                source,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashed::HashedProvider;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hello", "model-1", embedding.clone()).await;

        let retrieved = cache.get("hello", "model-1").await;
        assert_eq!(retrieved, Some(embedding));
        assert!(cache.get("hello", "model-2").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;
        cache.put("c", "model", vec![3.0]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(!cache.contains("a", "model").await);
    }

    #[tokio::test]
    async fn test_cached_provider_matches_inner() {
        let provider = CachedProvider::new(HashedProvider::new(16), EmbeddingCache::new(10));

        let first = provider.embed("rule text").await.unwrap();
        let second = provider.embed("rule text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, provider.inner().embed_text("rule text").unwrap());

        let stats = provider.cache_stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cached_batch_mixes_hits_and_misses() {
        let provider = CachedProvider::new(HashedProvider::new(16), EmbeddingCache::new(10));
        provider.embed("b").await.unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        let expected: Vec<_> = texts
            .iter()
            .map(|t| provider.inner().embed_text(t).unwrap())
            .collect();
        assert_eq!(batch, expected);
    }

    /// Answers every batch with one embedding too few.
    struct ShortBatchProvider(HashedProvider);

    #[async_trait]
    impl EmbeddingProvider for ShortBatchProvider {
        fn name(&self) -> &str {
            "short"
        }

        fn model(&self) -> &str {
            self.0.model()
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            let mut batch = self.0.embed_batch(texts).await?;
            batch.pop();
            Ok(batch)
        }
    }

    #[tokio::test]
    async fn test_cached_batch_rejects_short_provider_answer() {
        let provider = CachedProvider::new(
            ShortBatchProvider(HashedProvider::new(16)),
            EmbeddingCache::new(10),
        );
        provider.embed("a").await.unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)), "{err}");
        assert!(!provider.cache().contains("b", provider.model()).await);
    }

    #[tokio::test]
    async fn test_cached_batch_reports_caller_index() {
        let provider = CachedProvider::new(HashedProvider::new(16), EmbeddingCache::new(10));
        provider.embed("a").await.unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), String::new()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::BatchElement { index: 2, .. }));
    }
}
