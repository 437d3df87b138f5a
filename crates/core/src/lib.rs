//! Grove - Core library
//!
//! Approximate nearest-neighbor search over text embeddings with a forest of
//! random-projection trees, plus the retrieval layer that turns a question into a
//! ranked list of chunk ids (straight, multi-query, or reciprocal rank fusion).

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod retrieval;
pub mod storage;
pub mod vector;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Grove operations
pub type Result<T> = std::result::Result<T, GroveError>;

/// Error types for Grove operations
#[derive(Debug, Error)]
pub enum GroveError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Id {id} out of range (store holds {len} items)")]
    OutOfRange { id: u32, len: usize },

    #[error("No index has been built or loaded")]
    IndexNotBuilt,

    #[error("No chunk store has been loaded")]
    ChunksNotLoaded,

    #[error("Cannot build an index from an empty vector store")]
    EmptyInput,

    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Query expansion provider error: {0}")]
    ExpansionProvider(String),

    #[error("Answer generation provider error: {0}")]
    GenerationProvider(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vector store is full ({0} vectors)")]
    CapacityExceeded(usize),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Compression error: {0}")]
    Compression(#[from] storage::compression::CompressionError),
}

/// Coarse classification of a [`GroveError`], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DimensionMismatch,
    OutOfRange,
    IndexNotBuilt,
    ChunksNotLoaded,
    EmptyInput,
    EmptyQuery,
    CorruptData,
    UnsupportedVersion,
    EmbeddingProvider,
    ExpansionProvider,
    GenerationProvider,
    InvalidConfig,
    CapacityExceeded,
    Storage,
}

impl GroveError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GroveError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            GroveError::OutOfRange { .. } => ErrorKind::OutOfRange,
            GroveError::IndexNotBuilt => ErrorKind::IndexNotBuilt,
            GroveError::ChunksNotLoaded => ErrorKind::ChunksNotLoaded,
            GroveError::EmptyInput => ErrorKind::EmptyInput,
            GroveError::EmptyQuery => ErrorKind::EmptyQuery,
            GroveError::CorruptData(_) => ErrorKind::CorruptData,
            GroveError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            GroveError::EmbeddingProvider(_) => ErrorKind::EmbeddingProvider,
            GroveError::ExpansionProvider(_) => ErrorKind::ExpansionProvider,
            GroveError::GenerationProvider(_) => ErrorKind::GenerationProvider,
            GroveError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            GroveError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            GroveError::Storage(_)
            | GroveError::Io(_)
            | GroveError::Serialization(_)
            | GroveError::Compression(_) => ErrorKind::Storage,
        }
    }

    /// Whether a caller may retry the failed operation (with backoff).
    ///
    /// Only the network-backed provider errors qualify; index-layer errors point
    /// at programmer or data-integrity faults and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmbeddingProvider | ErrorKind::ExpansionProvider | ErrorKind::GenerationProvider
        )
    }
}

/// Structured, user-visible form of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&GroveError> for ErrorReport {
    fn from(err: &GroveError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

// Re-export commonly used items
pub use chunk::{Chunk, ChunkStore};
pub use embedding::{CachedEmbedder, Embedder};
pub use index::{AnnIndex, ForestBuilder, ForestConfig, Metric, RankedList, SearchHit};
pub use llm::{AnswerGenerator, QueryExpander};
pub use retrieval::{
    fusion::{reciprocal_rank_fusion, FusedEntry, FusedRanking, DEFAULT_RRF_K},
    Retrieval, RetrievalConfig, RetrievalStrategy, RetrievedId, Retriever,
};
pub use storage::{Codec, IndexStorage};
pub use vector::store::VectorStore;
