//! Dense vector table keyed by insertion order
//!
//! A [`VectorStore`] is filled once at embedding time and then moved into an
//! [`AnnIndex`](crate::index::AnnIndex) by the builder, after which it is only
//! reachable through shared references. All vectors share one dimensionality,
//! checked on insert so that a malformed embedding fails where it enters the
//! system rather than at query time.

use crate::{GroveError, Result};

/// Flat, row-major store of fixed-dimension `f32` vectors.
///
/// Ids are `u32`, dense and 0-based: the n-th vector added gets id `n - 1`.
///
/// # Examples
/// ```
/// use grove_core::vector::VectorStore;
///
/// let mut store = VectorStore::default();
/// assert_eq!(store.add(&[1.0, 0.0]).unwrap(), 0);
/// assert_eq!(store.add(&[0.0, 1.0]).unwrap(), 1);
/// assert_eq!(store.dimension(), 2);
///
/// // The first insert fixed the dimension
/// assert!(store.add(&[1.0, 2.0, 3.0]).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStore {
    /// 0 until fixed by `new` or by the first insert
    dimension: usize,
    data: Vec<f32>,
}

impl VectorStore {
    /// Create an empty store with a fixed dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Create an empty store with room for `capacity` vectors
    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * capacity),
        }
    }

    /// Append a vector and return its id
    ///
    /// # Errors
    /// * `DimensionMismatch` - If the vector is empty or its length differs
    ///   from the store's dimension
    /// * `CapacityExceeded` - If the store already holds `u32::MAX` vectors
    pub fn add(&mut self, vector: &[f32]) -> Result<u32> {
        if self.dimension == 0 {
            if vector.is_empty() {
                return Err(GroveError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            self.dimension = vector.len();
        }

        if vector.len() != self.dimension {
            return Err(GroveError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let id = u32::try_from(self.len()).map_err(|_| GroveError::CapacityExceeded(self.len()))?;
        if id == u32::MAX {
            return Err(GroveError::CapacityExceeded(self.len()));
        }

        self.data.extend_from_slice(vector);
        Ok(id)
    }

    /// Append several vectors, returning their ids
    ///
    /// Stops at the first invalid vector; the vectors before it stay in the store.
    pub fn add_batch<V: AsRef<[f32]>>(&mut self, vectors: &[V]) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(vectors.len());
        for vector in vectors {
            ids.push(self.add(vector.as_ref())?);
        }
        Ok(ids)
    }

    /// Look up a vector by id
    ///
    /// # Errors
    /// * `OutOfRange` - If no vector has this id
    pub fn get(&self, id: u32) -> Result<&[f32]> {
        let index = id as usize;
        if index >= self.len() {
            return Err(GroveError::OutOfRange { id, len: self.len() });
        }
        let start = index * self.dimension;
        Ok(&self.data[start..start + self.dimension])
    }

    /// Dimensionality shared by every vector (0 while unset)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate `(id, vector)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[f32])> + '_ {
        self.data
            .chunks_exact(self.dimension.max(1))
            .enumerate()
            .map(|(i, v)| (i as u32, v))
    }

    /// Row-major component buffer
    pub(crate) fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Rebuild a store from a row-major buffer (used by the codec)
    pub(crate) fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(GroveError::CorruptData(format!(
                "vector table of {} floats does not divide into rows of {}",
                data.len(),
                dimension
            )));
        }
        Ok(Self { dimension, data })
    }
}
