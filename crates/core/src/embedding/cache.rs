//! LRU cache in front of an embedder
//!
//! Interactive use repeats questions, and multi-query retrieval tends to
//! regenerate the same paraphrases, so query embeddings are worth caching.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use tracing::trace;

use super::Embedder;
use crate::{GroveError, Result};

/// Default number of cached embeddings
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `None` before any lookup
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64)
        }
    }
}

/// Wraps an [`Embedder`] with an LRU cache keyed by the exact input text
///
/// The cache sits behind a `Mutex` that is never held across a call into the
/// wrapped embedder, so concurrent misses embed in parallel.
///
/// # Example
///
/// ```
/// use grove_core::embedding::{CachedEmbedder, Embedder};
///
/// struct Length;
/// impl Embedder for Length {
///     fn embed(&self, text: &str) -> grove_core::Result<Vec<f32>> {
///         Ok(vec![text.len() as f32, 1.0])
///     }
///     fn dimension(&self) -> usize { 2 }
/// }
///
/// let cached = CachedEmbedder::new(Length, 100);
/// cached.embed("hello").unwrap();
/// cached.embed("hello").unwrap();
/// assert_eq!(cached.stats().hits, 1);
/// assert_eq!(cached.stats().misses, 1);
/// ```
#[derive(Debug)]
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Cache up to `capacity` embeddings (a capacity of 0 is treated as 1)
    pub fn new(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_default_size(inner: E) -> Self {
        Self::new(inner, DEFAULT_CACHE_SIZE)
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Current number of cached embeddings
    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().map(|cache| cache.cap().get()).unwrap_or(0)
    }

    /// Drop every cached embedding and reset the counters
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>>> {
        self.cache
            .lock()
            .map_err(|e| GroveError::EmbeddingProvider(format!("embedding cache lock poisoned: {e}")))
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.lock()?.get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(vector.clone());
        }

        let vector = self.inner.embed(text)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.lock()?.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing = Vec::new();

        {
            let mut cache = self.lock()?;
            for (slot, text) in texts.iter().enumerate() {
                match cache.get(*text) {
                    Some(vector) => results[slot] = Some(vector.clone()),
                    None => missing.push(slot),
                }
            }
        }
        self.hits
            .fetch_add((texts.len() - missing.len()) as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            let batch: Vec<&str> = missing.iter().map(|&slot| texts[slot]).collect();
            let computed = self.inner.embed_batch(&batch)?;
            if computed.len() != batch.len() {
                return Err(GroveError::EmbeddingProvider(format!(
                    "{} returned {} embeddings for {} texts",
                    self.inner.name(),
                    computed.len(),
                    batch.len()
                )));
            }
            self.misses.fetch_add(batch.len() as u64, Ordering::Relaxed);

            let mut cache = self.lock()?;
            for (slot, vector) in missing.into_iter().zip(computed) {
                cache.put(texts[slot].to_string(), vector.clone());
                results[slot] = Some(vector);
            }
        }

        trace!(texts = texts.len(), "batch embedded through cache");
        results
            .into_iter()
            .map(|vector| {
                vector.ok_or_else(|| GroveError::EmbeddingProvider("missing batch embedding".into()))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts calls into the wrapped embedder
    #[derive(Default)]
    struct CountingEmbedder {
        single_calls: AtomicUsize,
        batch_calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, text.chars().filter(|c| *c == 'a').count() as f32])
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, t.chars().filter(|c| *c == 'a').count() as f32])
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(GroveError::EmbeddingProvider("connection refused".into()))
        }

        fn dimension(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_cache_hit_skips_inner() {
        let cached = CachedEmbedder::new(CountingEmbedder::default(), 10);
        let first = cached.embed("banana").unwrap();
        let second = cached.embed("banana").unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner().single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cached.stats().hit_rate(), Some(0.5));
    }

    #[test]
    fn test_batch_only_sends_misses() {
        let cached = CachedEmbedder::new(CountingEmbedder::default(), 10);
        cached.embed("alpha").unwrap();

        let vectors = cached.embed_batch(&["alpha", "beta", "gamma"]).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vec![5.0, 2.0]);
        assert_eq!(vectors[2], vec![5.0, 2.0]);
        assert_eq!(cached.inner().batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 3 });
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn test_fully_cached_batch_makes_no_call() {
        let cached = CachedEmbedder::new(CountingEmbedder::default(), 10);
        cached.embed_batch(&["x", "y"]).unwrap();
        cached.embed_batch(&["y", "x"]).unwrap();
        assert_eq!(cached.inner().batch_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cached = CachedEmbedder::new(CountingEmbedder::default(), 2);
        cached.embed("one").unwrap();
        cached.embed("two").unwrap();
        cached.embed("three").unwrap();
        assert_eq!(cached.len(), 2);

        cached.embed("one").unwrap();
        assert_eq!(cached.inner().single_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let cached = CachedEmbedder::new(CountingEmbedder::default(), 0);
        assert_eq!(cached.capacity(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cached = CachedEmbedder::new(FailingEmbedder, 10);
        assert!(cached.embed("q").is_err());
        assert!(cached.is_empty());
        assert_eq!(cached.stats(), CacheStats::default());
    }

    #[test]
    fn test_clear_resets_everything() {
        let cached = CachedEmbedder::with_default_size(CountingEmbedder::default());
        cached.embed("a").unwrap();
        cached.embed("a").unwrap();
        cached.clear();
        assert!(cached.is_empty());
        assert_eq!(cached.stats().hit_rate(), None);
        assert_eq!(cached.capacity(), DEFAULT_CACHE_SIZE);
    }
}
