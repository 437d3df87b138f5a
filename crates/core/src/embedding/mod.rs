//! Text embedding providers
//!
//! The index never computes embeddings itself; it consumes them through the
//! [`Embedder`] trait. Implementations:
//!
//! - [`OllamaEmbedder`]: HTTP client for an Ollama server's `/api/embed`
//!   endpoint (feature `ollama`, on by default)
//! - [`CachedEmbedder`]: LRU cache in front of any other embedder, for repeated
//!   queries
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "ollama")]
//! # {
//! use std::time::Duration;
//! use grove_core::embedding::{CachedEmbedder, Embedder, OllamaEmbedder};
//!
//! let embedder = OllamaEmbedder::new("http://localhost:11434", "nomic-embed-text")
//!     .with_timeout(Duration::from_secs(30));
//! let cached = CachedEmbedder::new(embedder, 1_000);
//!
//! let vector = cached.embed("Who designed the Eiffel Tower?")?;
//! let batch = cached.embed_batch(&["first passage", "second passage"])?;
//! assert_eq!(batch.len(), 2);
//! # }
//! # Ok::<(), grove_core::GroveError>(())
//! ```

mod cache;
#[cfg(feature = "ollama")]
mod ollama;

pub use cache::{CacheStats, CachedEmbedder};
#[cfg(feature = "ollama")]
pub use ollama::OllamaEmbedder;

use crate::Result;

/// Maps text to a fixed-length vector
///
/// Failures are reported as
/// [`GroveError::EmbeddingProvider`](crate::GroveError::EmbeddingProvider).
pub trait Embedder: Send + Sync {
    /// Embed one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning vectors in input order
    ///
    /// The default calls [`embed`](Self::embed) once per text; providers with a
    /// batch endpoint should override it.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Output dimensionality, or 0 if only known after the first call
    fn dimension(&self) -> usize;

    /// Short identifier for logs
    fn name(&self) -> &str {
        "embedder"
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
