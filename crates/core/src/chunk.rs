//! Chunk records and the id-addressed chunk store
//!
//! Chunks are the retrievable text units. Their ids are the same dense ids the
//! vector store assigns, so the n-th chunk is embedded as the n-th vector and a
//! search hit resolves to its chunk by position.

use serde::{Deserialize, Serialize};

use crate::{GroveError, Result};

/// A unit of retrievable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u32,
    pub text: String,
    /// Where the text came from (article title, URL, file path)
    #[serde(default)]
    pub source: String,
}

/// Ordered chunks where `chunks[i].id == i`
///
/// Serializes as a plain JSON array of chunks; deserialization re-checks the id
/// ordering.
///
/// ```
/// use grove_core::chunk::ChunkStore;
///
/// let mut store = ChunkStore::new();
/// let id = store.push("Rust is a systems language.", "intro.md").unwrap();
/// assert_eq!(store.get(id).unwrap().text, "Rust is a systems language.");
/// assert!(store.get(id + 1).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Chunk>", into = "Vec<Chunk>")]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap chunks that already carry positional ids
    ///
    /// # Errors
    /// * `CorruptData` - If any chunk's id differs from its position
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        if let Some((position, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| chunk.id as usize != *position)
        {
            return Err(GroveError::CorruptData(format!(
                "chunk at position {position} has id {}",
                chunk.id
            )));
        }
        if chunks.len() > u32::MAX as usize {
            return Err(GroveError::CapacityExceeded(chunks.len()));
        }
        Ok(Self { chunks })
    }

    /// Build a store from `(text, source)` pairs, numbering them in order
    pub fn from_texts<I, T, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for (text, source) in items {
            store.push(text, source)?;
        }
        Ok(store)
    }

    /// Append a chunk, returning its id
    pub fn push(&mut self, text: impl Into<String>, source: impl Into<String>) -> Result<u32> {
        let id = u32::try_from(self.chunks.len())
            .map_err(|_| GroveError::CapacityExceeded(self.chunks.len()))?;
        self.chunks.push(Chunk {
            id,
            text: text.into(),
            source: source.into(),
        });
        Ok(id)
    }

    /// # Errors
    /// * `OutOfRange` - If no chunk has this id
    pub fn get(&self, id: u32) -> Result<&Chunk> {
        self.chunks.get(id as usize).ok_or(GroveError::OutOfRange {
            id,
            len: self.chunks.len(),
        })
    }

    /// Resolve ids to chunks, preserving order
    ///
    /// Fails on the first unknown id instead of skipping it.
    pub fn resolve(&self, ids: &[u32]) -> Result<Vec<&Chunk>> {
        ids.iter().map(|&id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

impl TryFrom<Vec<Chunk>> for ChunkStore {
    type Error = GroveError;

    fn try_from(chunks: Vec<Chunk>) -> Result<Self> {
        Self::from_chunks(chunks)
    }
}

impl From<ChunkStore> for Vec<Chunk> {
    fn from(store: ChunkStore) -> Self {
        store.chunks
    }
}
