//! Random-projection forest index
//!
//! The index is a forest of binary trees. Each tree recursively splits the vector
//! set with a hyperplane halfway between two randomly sampled points until every
//! leaf holds at most `leaf_capacity` ids. Points that are close tend to share
//! leaves in many of the independently built trees, so a best-first walk over all
//! trees gathers a small candidate set that is then ranked exactly.
//!
//! - [`ForestBuilder`]: builds an [`AnnIndex`] from a [`VectorStore`](crate::VectorStore)
//! - [`AnnIndex::search`]: budgeted approximate top-N query
//! - [`codec`]: stable binary layout for saving and loading an index
//!
//! # Example
//!
//! ```
//! use grove_core::index::{ForestBuilder, ForestConfig};
//! use grove_core::vector::VectorStore;
//!
//! let mut store = VectorStore::new(2);
//! for i in 0..100 {
//!     let angle = i as f32 * 0.06;
//!     store.add(&[angle.cos(), angle.sin()]).unwrap();
//! }
//!
//! let index = ForestBuilder::new(ForestConfig::default().with_seed(7))
//!     .build(store)
//!     .unwrap();
//!
//! let query = index.store().get(42).unwrap().to_vec();
//! let results = index.search(&query, 3, 200).unwrap();
//! assert_eq!(results.hits[0].id, 42);
//! ```

pub mod builder;
pub mod codec;
pub mod search;
pub mod tree;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::vector::ops::{angular_distance_unchecked, l2_distance_unchecked, normalize};
use crate::vector::VectorStore;
use crate::{GroveError, Result};

pub use builder::ForestBuilder;
pub use search::{RankedList, SearchHit};
pub use tree::{Forest, Node, Tree};

/// Default number of trees in a forest
pub const DEFAULT_TREE_COUNT: usize = 10;
/// Default maximum number of ids per leaf
pub const DEFAULT_LEAF_CAPACITY: usize = 32;
/// Default number of random hyperplanes tried before falling back to a median split
pub const DEFAULT_MAX_SPLIT_ATTEMPTS: usize = 5;
/// Default number of tree nodes a query may visit
pub const DEFAULT_SEARCH_BUDGET: usize = 500;

/// Distance metric used both to place hyperplanes and to rank candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `sqrt(2 - 2 cos)`: Euclidean distance between unit-normalized vectors
    #[default]
    Angular,
    /// Plain L2 distance
    Euclidean,
}

impl Metric {
    /// Identifier stored in the index file header
    pub fn id(&self) -> u8 {
        match self {
            Metric::Angular => 1,
            Metric::Euclidean => 2,
        }
    }

    /// Parse the identifier stored in an index file header
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Metric::Angular),
            2 => Ok(Metric::Euclidean),
            other => Err(GroveError::UnsupportedVersion(format!("unknown metric id {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Angular => "angular",
            Metric::Euclidean => "euclidean",
        }
    }

    /// Distance between two vectors of equal length
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Angular => angular_distance_unchecked(a, b),
            Metric::Euclidean => l2_distance_unchecked(a, b),
        }
    }

    /// Map a distance to a "higher is better" score
    ///
    /// Angular distances become cosine similarity (`1 - d^2 / 2`); Euclidean
    /// distances are negated.
    #[inline]
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            Metric::Angular => 1.0 - distance * distance / 2.0,
            Metric::Euclidean => -distance,
        }
    }

    /// The representation hyperplanes are evaluated against
    ///
    /// Angular splits operate on unit vectors, so the vector is normalized;
    /// Euclidean splits use it as is.
    pub(crate) fn prepare<'a>(&self, vector: &'a [f32]) -> Cow<'a, [f32]> {
        match self {
            Metric::Angular => {
                let mut owned = vector.to_vec();
                normalize(&mut owned);
                Cow::Owned(owned)
            }
            Metric::Euclidean => Cow::Borrowed(vector),
        }
    }
}

/// Configuration for building a forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of independent trees. More trees raise recall and memory use.
    pub tree_count: usize,
    /// Maximum ids per leaf
    pub leaf_capacity: usize,
    /// Metric for splits and ranking
    pub metric: Metric,
    /// Random hyperplanes tried per node before the median fallback
    pub max_split_attempts: usize,
    /// Seed for reproducible forests; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            tree_count: DEFAULT_TREE_COUNT,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            metric: Metric::default(),
            max_split_attempts: DEFAULT_MAX_SPLIT_ATTEMPTS,
            seed: None,
        }
    }
}

impl ForestConfig {
    /// Set the number of trees
    pub fn with_tree_count(mut self, tree_count: usize) -> Self {
        self.tree_count = tree_count;
        self
    }

    /// Set the leaf capacity
    pub fn with_leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity;
        self
    }

    /// Set the metric
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Fix the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that the configuration can build a forest
    pub fn validate(&self) -> Result<()> {
        if self.tree_count == 0 {
            return Err(GroveError::InvalidConfig("tree_count must be at least 1".into()));
        }
        if self.tree_count > u32::MAX as usize {
            return Err(GroveError::InvalidConfig("tree_count does not fit in u32".into()));
        }
        if self.leaf_capacity == 0 {
            return Err(GroveError::InvalidConfig("leaf_capacity must be at least 1".into()));
        }
        if self.leaf_capacity > u32::MAX as usize {
            return Err(GroveError::InvalidConfig("leaf_capacity does not fit in u32".into()));
        }
        Ok(())
    }
}

/// A built, immutable index: the frozen vector store plus its forest
///
/// `AnnIndex` is `Send + Sync` and only ever read after construction, so one
/// instance can serve any number of concurrent queries behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AnnIndex {
    store: VectorStore,
    forest: Forest,
    config: ForestConfig,
}

impl AnnIndex {
    pub(crate) fn from_parts(store: VectorStore, forest: Forest, config: ForestConfig) -> Self {
        Self { store, forest, config }
    }

    /// The vectors this index was built over
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Build parameters (seed and split attempts are not persisted)
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn metric(&self) -> Metric {
        self.config.metric
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
