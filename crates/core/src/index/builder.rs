//! Forest construction
//!
//! Each tree is grown with an explicit work stack rather than recursion, so deep
//! trees over degenerate data cannot overflow the call stack. Trees are
//! independent and are built in parallel with rayon; each one draws from its own
//! RNG seeded from the forest seed and the tree index, which keeps a seeded build
//! reproducible regardless of thread scheduling.

use std::borrow::Cow;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use super::tree::{margin, Forest, Node, Tree};
use super::{AnnIndex, ForestConfig, Metric};
use crate::vector::ops::{magnitude, normalize};
use crate::vector::VectorStore;
use crate::{GroveError, Result};

/// Builds an [`AnnIndex`] from a filled [`VectorStore`]
///
/// # Example
///
/// ```
/// use grove_core::index::{ForestBuilder, ForestConfig};
/// use grove_core::vector::VectorStore;
///
/// let mut store = VectorStore::new(3);
/// store.add(&[1.0, 0.0, 0.0]).unwrap();
/// store.add(&[0.0, 1.0, 0.0]).unwrap();
///
/// let index = ForestBuilder::new(ForestConfig::default()).build(store).unwrap();
/// assert_eq!(index.len(), 2);
/// assert_eq!(index.forest().len(), 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ForestBuilder {
    config: ForestConfig,
}

impl ForestBuilder {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Build the forest, taking ownership of the store
    ///
    /// # Errors
    /// * `InvalidConfig` - If `tree_count` or `leaf_capacity` is zero
    /// * `EmptyInput` - If the store holds no vectors
    pub fn build(&self, store: VectorStore) -> Result<AnnIndex> {
        self.config.validate()?;
        if store.is_empty() {
            return Err(GroveError::EmptyInput);
        }

        let start = Instant::now();
        let seed = self.config.seed.unwrap_or_else(rand::random);
        debug!(
            seed,
            vectors = store.len(),
            dimension = store.dimension(),
            "building forest"
        );

        let points = PointTable::new(&store, self.config.metric);
        let ids: Vec<u32> = (0..store.len() as u32).collect();

        let trees: Vec<Tree> = (0..self.config.tree_count)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, tree_index as u64));
                grow_tree(&points, ids.clone(), &self.config, &mut rng)
            })
            .collect();

        let forest = Forest::new(trees);
        info!(
            trees = forest.len(),
            nodes = forest.node_count(),
            vectors = store.len(),
            metric = self.config.metric.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "forest built"
        );

        Ok(AnnIndex::from_parts(store, forest, self.config.clone()))
    }
}

/// Row lookup over the vectors hyperplanes are fitted to
///
/// For the angular metric this is a normalized copy of the store; for
/// Euclidean it borrows the store's buffer.
struct PointTable<'a> {
    dimension: usize,
    data: Cow<'a, [f32]>,
}

impl<'a> PointTable<'a> {
    fn new(store: &'a VectorStore, metric: Metric) -> Self {
        let dimension = store.dimension();
        let data = match metric {
            Metric::Angular => {
                let mut owned = store.as_flat().to_vec();
                for row in owned.chunks_exact_mut(dimension) {
                    normalize(row);
                }
                Cow::Owned(owned)
            }
            Metric::Euclidean => Cow::Borrowed(store.as_flat()),
        };
        Self { dimension, data }
    }

    #[inline]
    fn point(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

/// Outcome of splitting one node's ids
struct Split {
    normal: Vec<f32>,
    offset: f32,
    left: Vec<u32>,
    right: Vec<u32>,
}

fn grow_tree<R: Rng>(
    points: &PointTable<'_>,
    ids: Vec<u32>,
    config: &ForestConfig,
    rng: &mut R,
) -> Tree {
    let mut nodes = vec![Node::Leaf { ids: Vec::new() }];
    let mut pending = vec![(0usize, ids)];

    while let Some((slot, mut ids)) = pending.pop() {
        if ids.len() <= config.leaf_capacity {
            ids.sort_unstable();
            nodes[slot] = Node::Leaf { ids };
            continue;
        }

        let split = split_ids(points, &ids, config.max_split_attempts, rng);
        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf { ids: Vec::new() });
        nodes.push(Node::Leaf { ids: Vec::new() });
        nodes[slot] = Node::Split {
            normal: split.normal,
            offset: split.offset,
            left: left as u32,
            right: right as u32,
        };

        pending.push((right, split.right));
        pending.push((left, split.left));
    }

    Tree::from_nodes(nodes)
}

/// Split `ids` (more than one) into two non-empty halves
fn split_ids<R: Rng>(
    points: &PointTable<'_>,
    ids: &[u32],
    max_attempts: usize,
    rng: &mut R,
) -> Split {
    for _ in 0..max_attempts {
        let a = rng.gen_range(0..ids.len());
        let mut b = rng.gen_range(0..ids.len() - 1);
        if b >= a {
            b += 1;
        }

        let Some((normal, offset)) = bisecting_plane(points.point(ids[a]), points.point(ids[b]))
        else {
            continue;
        };

        let (left, right): (Vec<u32>, Vec<u32>) = ids
            .iter()
            .copied()
            .partition(|&id| margin(&normal, offset, points.point(id)) <= 0.0);
        if !left.is_empty() && !right.is_empty() {
            return Split {
                normal,
                offset,
                left,
                right,
            };
        }
    }

    median_split(points, ids)
}

/// Hyperplane equidistant from `p` and `q`, or `None` if they coincide
fn bisecting_plane(p: &[f32], q: &[f32]) -> Option<(Vec<f32>, f32)> {
    let mut normal: Vec<f32> = p.iter().zip(q).map(|(a, b)| a - b).collect();
    let norm = magnitude(&normal);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    for x in normal.iter_mut() {
        *x /= norm;
    }

    let offset = normal
        .iter()
        .zip(p.iter().zip(q))
        .map(|(n, (a, b))| n * (a + b) * 0.5)
        .sum();
    Some((normal, offset))
}

/// Axis-aligned split at the median of the highest-variance coordinate
///
/// Always yields two non-empty halves, even when every point is identical.
fn median_split(points: &PointTable<'_>, ids: &[u32]) -> Split {
    let axis = widest_axis(points, ids);

    let mut sorted = ids.to_vec();
    sorted.sort_by(|&a, &b| {
        points.point(a)[axis]
            .total_cmp(&points.point(b)[axis])
            .then(a.cmp(&b))
    });

    let half = sorted.len() / 2;
    let below = points.point(sorted[half - 1])[axis];
    let above = points.point(sorted[half])[axis];
    let right = sorted.split_off(half);

    let mut normal = vec![0.0; points.dimension];
    normal[axis] = 1.0;

    Split {
        normal,
        offset: (below + above) * 0.5,
        left: sorted,
        right,
    }
}

/// Coordinate with the largest variance over `ids`; lowest index on ties
fn widest_axis(points: &PointTable<'_>, ids: &[u32]) -> usize {
    let n = ids.len() as f64;
    let mut best = (0usize, f64::NEG_INFINITY);

    for axis in 0..points.dimension {
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &id in ids {
            let x = points.point(id)[axis] as f64;
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n;
        let variance = sum_sq / n - mean * mean;
        if variance > best.1 {
            best = (axis, variance);
        }
    }

    best.0
}

/// Per-tree seed derived with a splitmix64 step
fn tree_seed(seed: u64, tree_index: u64) -> u64 {
    let mut z = seed ^ tree_index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
