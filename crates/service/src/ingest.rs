//! Ingest: chunk texts → embeddings → forest → storage

use std::path::Path;
use std::time::Instant;

use grove_core::storage::IndexStorage;
use grove_core::{
    AnnIndex, ChunkStore, Embedder, ForestBuilder, ForestConfig, GroveError, Result, VectorStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Chunks sent per embedding request
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// One record of an ingest input file
///
/// Input files are a JSON array of these; ids are assigned by position.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    #[serde(default)]
    pub source: String,
}

/// What an ingest run produced
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunks: usize,
    pub dimension: usize,
    pub trees: usize,
    pub nodes: usize,
    pub index_bytes: usize,
    pub chunk_bytes: usize,
    pub elapsed_ms: u64,
}

/// Read a JSON array of [`ChunkRecord`]s into a chunk store
pub fn read_chunk_file(path: &Path) -> Result<ChunkStore> {
    let bytes = std::fs::read(path)?;
    let records: Vec<ChunkRecord> = serde_json::from_slice(&bytes)
        .map_err(|e| GroveError::CorruptData(format!("{}: {e}", path.display())))?;
    ChunkStore::from_texts(records.into_iter().map(|r| (r.text, r.source)))
}

/// Embed every chunk in order, `batch_size` texts per provider call
///
/// The n-th chunk becomes the n-th vector, so vector ids equal chunk ids.
///
/// # Errors
/// * `EmptyInput` - If there are no chunks
/// * `InvalidConfig` - If `batch_size` is zero
/// * `EmbeddingProvider` - If a call fails or returns the wrong number of vectors
/// * `DimensionMismatch` - If the provider changes width between batches
pub fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &ChunkStore,
    batch_size: usize,
) -> Result<VectorStore> {
    if chunks.is_empty() {
        return Err(GroveError::EmptyInput);
    }
    if batch_size == 0 {
        return Err(GroveError::InvalidConfig("batch_size must be at least 1".into()));
    }

    let mut store = VectorStore::default();
    let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    let batches = texts.len().div_ceil(batch_size);

    for (batch, slice) in texts.chunks(batch_size).enumerate() {
        let vectors = embedder.embed_batch(slice)?;
        if vectors.len() != slice.len() {
            return Err(GroveError::EmbeddingProvider(format!(
                "{} returned {} embeddings for a batch of {}",
                embedder.name(),
                vectors.len(),
                slice.len()
            )));
        }
        store.add_batch(&vectors)?;
        debug!(batch = batch + 1, batches, embedded = store.len(), "batch embedded");
    }

    Ok(store)
}

/// Embed `chunks`, build a forest over them and persist both
#[instrument(skip_all, fields(chunks = chunks.len(), index = index_name, chunk_store = chunks_name))]
pub fn ingest(
    embedder: &dyn Embedder,
    chunks: &ChunkStore,
    forest: &ForestConfig,
    batch_size: usize,
    storage: &IndexStorage,
    index_name: &str,
    chunks_name: &str,
) -> Result<IngestReport> {
    let start = Instant::now();
    forest.validate()?;

    let vectors = embed_chunks(embedder, chunks, batch_size)?;
    let index: AnnIndex = ForestBuilder::new(forest.clone()).build(vectors)?;

    let index_stats = storage.save_index(index_name, &index)?;
    let chunk_stats = storage.save_chunks(chunks_name, chunks)?;

    let report = IngestReport {
        chunks: chunks.len(),
        dimension: index.dimension(),
        trees: index.forest().len(),
        nodes: index.forest().node_count(),
        index_bytes: index_stats.compressed_size,
        chunk_bytes: chunk_stats.compressed_size,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        dimension = report.dimension,
        trees = report.trees,
        nodes = report.nodes,
        elapsed_ms = report.elapsed_ms,
        "ingest complete"
    );
    Ok(report)
}
