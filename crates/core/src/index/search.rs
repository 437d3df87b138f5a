//! Budgeted best-first search over the forest
//!
//! All tree roots enter a shared max-priority queue. Each pop costs one unit of
//! the search budget: leaves contribute their ids as candidates, splits push both
//! children with a priority capped by the query's signed margin to the
//! hyperplane. The candidate set is then ranked exactly against the stored
//! vectors, so the result quality depends only on which ids were reached.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::tree::{margin, Node};
use super::AnnIndex;
use crate::{GroveError, Result};

/// One ranked result: a vector id and its exact distance to the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u32,
    pub distance: f32,
}

/// Ids ordered by ascending distance (ties by ascending id)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub hits: Vec<SearchHit>,
}

impl RankedList {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn ids(&self) -> Vec<u32> {
        self.hits.iter().map(|hit| hit.id).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }

    pub fn truncate(&mut self, len: usize) {
        self.hits.truncate(len);
    }
}

impl IntoIterator for RankedList {
    type Item = SearchHit;
    type IntoIter = std::vec::IntoIter<SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

/// Queue entry: larger priority pops first, then lower tree, then lower node
#[derive(Debug, Clone, Copy)]
struct Frontier {
    priority: f32,
    tree: u32,
    node: u32,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl AnnIndex {
    /// Approximate `top_n` nearest neighbours of `query`
    ///
    /// `search_budget` bounds the number of tree nodes visited across all trees.
    /// A budget of zero visits nothing and returns an empty list; raising it
    /// grows the candidate set and with it recall.
    ///
    /// # Errors
    /// * `DimensionMismatch` - If `query` does not match the index dimension
    pub fn search(&self, query: &[f32], top_n: usize, search_budget: usize) -> Result<RankedList> {
        if query.len() != self.dimension() {
            return Err(GroveError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if top_n == 0 {
            return Ok(RankedList::default());
        }

        let metric = self.metric();
        let prepared = metric.prepare(query);
        let candidates = self.collect_candidates(&prepared, search_budget);

        let mut hits = candidates
            .into_iter()
            .map(|id| {
                let vector = self.store().get(id)?;
                Ok(SearchHit {
                    id,
                    distance: metric.distance(query, vector),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(top_n);
        Ok(RankedList::new(hits))
    }

    /// Run [`search`](Self::search) for many queries in parallel
    ///
    /// Results are returned in query order.
    pub fn search_batch<Q>(
        &self,
        queries: &[Q],
        top_n: usize,
        search_budget: usize,
    ) -> Result<Vec<RankedList>>
    where
        Q: AsRef<[f32]> + Sync,
    {
        queries
            .par_iter()
            .map(|query| self.search(query.as_ref(), top_n, search_budget))
            .collect()
    }

    /// Sorted, de-duplicated ids reached within the budget
    fn collect_candidates(&self, query: &[f32], search_budget: usize) -> Vec<u32> {
        let trees = self.forest().trees();
        let mut frontier = BinaryHeap::with_capacity(trees.len() * 2);
        for tree in 0..trees.len() {
            frontier.push(Frontier {
                priority: f32::INFINITY,
                tree: tree as u32,
                node: 0,
            });
        }

        let mut candidates = Vec::new();
        let mut visited = 0;
        while visited < search_budget {
            let Some(entry) = frontier.pop() else {
                break;
            };
            visited += 1;

            match trees[entry.tree as usize].node(entry.node) {
                Some(Node::Leaf { ids }) => candidates.extend_from_slice(ids),
                Some(Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                }) => {
                    let m = margin(normal, *offset, query);
                    frontier.push(Frontier {
                        priority: entry.priority.min(m),
                        tree: entry.tree,
                        node: *right,
                    });
                    frontier.push(Frontier {
                        priority: entry.priority.min(-m),
                        tree: entry.tree,
                        node: *left,
                    });
                }
                None => {}
            }
        }

        candidates.sort_unstable();
        candidates.dedup();
        trace!(visited, candidates = candidates.len(), "forest walk finished");
        candidates
    }
}
