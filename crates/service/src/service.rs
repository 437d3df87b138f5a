//! Long-lived retrieval service
//!
//! [`RetrievalService`] owns the loaded index, the chunk store, the providers
//! and the current retrieval settings. Request handlers share one instance
//! through an `Arc`; reloading an index or changing settings are method calls
//! that take effect for the next request.
//!
//! Each request snapshots the index and chunk store (`Arc` clones) and the
//! settings, then releases every lock before the embedding, expansion and
//! generation calls, so a slow provider never blocks a reload.

use std::sync::{Arc, PoisonError, RwLock};

use grove_core::storage::IndexStorage;
use grove_core::{
    AnnIndex, AnswerGenerator, ChunkStore, Embedder, ErrorReport, GroveError, QueryExpander, Result,
    RetrievalConfig, RetrievalStrategy, Retriever,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// The settings a front end may change at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub multi_query: bool,
    pub rag_fusion: bool,
    pub result_count: usize,
    pub variant_count: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let config = RetrievalConfig::default();
        Self {
            multi_query: false,
            rag_fusion: false,
            result_count: config.result_count,
            variant_count: config.variant_count,
        }
    }
}

impl RetrievalSettings {
    pub fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::from_flags(self.multi_query, self.rag_fusion)
    }
}

/// A retrieved chunk with its strategy-specific score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: u32,
    pub score: f64,
    pub text: String,
    pub source: String,
}

/// Generated answer plus the chunks it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub strategy: RetrievalStrategy,
    pub chunks: Vec<RetrievedChunk>,
    pub answer: String,
}

/// JSON body for a request outcome: the value on success, an [`ErrorReport`]
/// (kind, message, retryable) on failure
pub fn json_outcome<T: Serialize>(outcome: &Result<T>) -> serde_json::Result<String> {
    match outcome {
        Ok(value) => serde_json::to_string_pretty(value),
        Err(err) => serde_json::to_string_pretty(&ErrorReport::from(err)),
    }
}

/// What is currently loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub index_loaded: bool,
    pub vectors: usize,
    pub dimension: usize,
    pub chunks_loaded: bool,
    pub chunks: usize,
    /// False when both are loaded with different lengths
    pub sizes_match: bool,
}

pub struct RetrievalService {
    storage: IndexStorage,
    embedder: Arc<dyn Embedder>,
    expander: Arc<dyn QueryExpander>,
    generator: Arc<dyn AnswerGenerator>,
    index: RwLock<Option<Arc<AnnIndex>>>,
    chunks: RwLock<Option<Arc<ChunkStore>>>,
    config: RwLock<RetrievalConfig>,
}

impl RetrievalService {
    /// A service with nothing loaded
    ///
    /// # Errors
    /// * `InvalidConfig` - If `config` fails validation
    pub fn new(
        storage: IndexStorage,
        embedder: Arc<dyn Embedder>,
        expander: Arc<dyn QueryExpander>,
        generator: Arc<dyn AnswerGenerator>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            embedder,
            expander,
            generator,
            index: RwLock::new(None),
            chunks: RwLock::new(None),
            config: RwLock::new(config),
        })
    }

    pub fn storage(&self) -> &IndexStorage {
        &self.storage
    }

    /// Load the index stored under `name` and make it current
    #[instrument(skip(self))]
    pub fn load_index(&self, name: &str) -> Result<()> {
        let index = self.storage.load_index(name)?;
        self.install_index(index)
    }

    /// Load the chunk store stored under `name` and make it current
    #[instrument(skip(self))]
    pub fn load_chunks(&self, name: &str) -> Result<()> {
        let chunks = self.storage.load_chunks(name)?;
        self.install_chunks(chunks);
        Ok(())
    }

    /// Replace the current index
    ///
    /// # Errors
    /// * `DimensionMismatch` - If the embedder has a known width that differs
    ///   from the index dimension
    pub fn install_index(&self, index: AnnIndex) -> Result<()> {
        let expected = self.embedder.dimension();
        if expected != 0 && expected != index.dimension() {
            return Err(GroveError::DimensionMismatch {
                expected,
                actual: index.dimension(),
            });
        }
        if let Some(chunks) = self.current_chunks() {
            warn_on_size_mismatch(index.len(), chunks.len());
        }

        info!(vectors = index.len(), dimension = index.dimension(), "index installed");
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(index));
        Ok(())
    }

    /// Replace the current chunk store
    pub fn install_chunks(&self, chunks: ChunkStore) {
        if let Some(index) = self.current_index() {
            warn_on_size_mismatch(index.len(), chunks.len());
        }
        info!(chunks = chunks.len(), "chunk store installed");
        *self.chunks.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(chunks));
    }

    /// Change strategy and counts for subsequent requests
    ///
    /// # Errors
    /// * `InvalidConfig` - If `result_count` is zero
    #[instrument(skip(self))]
    pub fn configure(&self, settings: RetrievalSettings) -> Result<()> {
        let mut next = self.config();
        next.strategy = settings.strategy();
        next.result_count = settings.result_count;
        next.variant_count = settings.variant_count;
        next.validate()?;

        if settings.multi_query && settings.rag_fusion {
            warn!("both multi_query and rag_fusion requested, using multi_query");
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    /// Current runtime settings
    pub fn settings(&self) -> RetrievalSettings {
        let config = self.config();
        RetrievalSettings {
            multi_query: config.strategy == RetrievalStrategy::MultiQuery,
            rag_fusion: config.strategy == RetrievalStrategy::RagFusion,
            result_count: config.result_count,
            variant_count: config.variant_count,
        }
    }

    /// Full retrieval configuration, including the non-runtime fields
    pub fn config(&self) -> RetrievalConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> ServiceStatus {
        let index = self.current_index();
        let chunks = self.current_chunks();
        ServiceStatus {
            index_loaded: index.is_some(),
            vectors: index.as_ref().map_or(0, |i| i.len()),
            dimension: index.as_ref().map_or(0, |i| i.dimension()),
            chunks_loaded: chunks.is_some(),
            chunks: chunks.as_ref().map_or(0, |c| c.len()),
            sizes_match: match (&index, &chunks) {
                (Some(index), Some(chunks)) => index.len() == chunks.len(),
                _ => true,
            },
        }
    }

    /// Chunks relevant to `question`, best first
    ///
    /// # Errors
    /// * `IndexNotBuilt` / `ChunksNotLoaded` - If nothing has been loaded
    /// * `EmptyQuery` - If the question is blank
    /// * `OutOfRange` - If the index returns an id the chunk store lacks
    /// * Provider errors from embedding or expansion
    #[instrument(skip(self), fields(strategy))]
    pub fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let (_, chunks) = self.retrieve_with_strategy(question)?;
        Ok(chunks)
    }

    /// Retrieve supporting chunks, then generate an answer from them
    #[instrument(skip(self), fields(strategy))]
    pub fn ask(&self, question: &str) -> Result<Answer> {
        let (strategy, chunks) = self.retrieve_with_strategy(question)?;
        let passages: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let answer = self.generator.generate(question, &passages)?;
        info!(chunks = chunks.len(), chars = answer.len(), "answer generated");
        Ok(Answer {
            strategy,
            chunks,
            answer,
        })
    }

    fn retrieve_with_strategy(&self, question: &str) -> Result<(RetrievalStrategy, Vec<RetrievedChunk>)> {
        let index = self.current_index().ok_or(GroveError::IndexNotBuilt)?;
        let chunks = self.current_chunks().ok_or(GroveError::ChunksNotLoaded)?;
        let config = self.config();
        tracing::Span::current().record("strategy", config.strategy.name());

        let retriever = Retriever::new(&index, self.embedder.as_ref(), self.expander.as_ref(), config);
        let retrieval = retriever.retrieve(question)?;

        let resolved = retrieval
            .hits
            .iter()
            .map(|hit| {
                let chunk = chunks.get(hit.id)?;
                Ok(RetrievedChunk {
                    id: hit.id,
                    score: hit.score,
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(queries = retrieval.queries.len(), hits = resolved.len(), "retrieved");
        Ok((retrieval.strategy, resolved))
    }

    fn current_index(&self) -> Option<Arc<AnnIndex>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn current_chunks(&self) -> Option<Arc<ChunkStore>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn warn_on_size_mismatch(vectors: usize, chunks: usize) {
    if vectors != chunks {
        warn!(vectors, chunks, "index and chunk store sizes differ");
    }
}
