//! Tree and forest data model
//!
//! Trees are stored as arenas: a `Vec<Node>` with the root at slot 0 and
//! children referenced by slot. The builder always places children after their
//! parent, which the codec relies on to reject cyclic input.

use crate::vector::ops::dot_product_unchecked;

/// A node of a random-projection tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Terminal bucket of vector ids
    Leaf { ids: Vec<u32> },
    /// Hyperplane `dot(normal, x) = offset`. Points with a positive margin live
    /// under `right`, all others under `left`.
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: u32,
        right: u32,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Signed distance of `point` from the hyperplane (`normal` is unit length)
#[inline]
pub fn margin(normal: &[f32], offset: f32, point: &[f32]) -> f32 {
    dot_product_unchecked(normal, point) - offset
}

/// One random-projection tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        debug_assert!(!nodes.is_empty(), "a tree has at least a root");
        Self { nodes }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn node(&self, slot: u32) -> Option<&Node> {
        self.nodes.get(slot as usize)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total node count (splits and leaves)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Length of the longest root-to-leaf path, counted in nodes
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0u32, 1usize)];
        while let Some((slot, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Some(Node::Split { left, right, .. }) = self.node(slot) {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }

    /// Ids of every leaf, in slot order
    pub fn leaf_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Leaf { ids } => Some(ids),
                Node::Split { .. } => None,
            })
            .flat_map(|ids| ids.iter().copied())
    }
}

/// Ordered collection of independently built trees
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    trees: Vec<Tree>,
}

impl Forest {
    pub(crate) fn new(trees: Vec<Tree>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn tree(&self, index: usize) -> Option<&Tree> {
        self.trees.get(index)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Total nodes across all trees
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(Tree::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> Tree {
        Tree::from_nodes(vec![
            Node::Split {
                normal: vec![1.0, 0.0],
                offset: 0.5,
                left: 1,
                right: 2,
            },
            Node::Leaf { ids: vec![0, 2] },
            Node::Split {
                normal: vec![0.0, 1.0],
                offset: 0.0,
                left: 3,
                right: 4,
            },
            Node::Leaf { ids: vec![1] },
            Node::Leaf { ids: vec![3, 4] },
        ])
    }

    #[test]
    fn test_margin_sign() {
        let normal = [1.0, 0.0];
        assert!(margin(&normal, 0.5, &[1.0, 7.0]) > 0.0);
        assert!(margin(&normal, 0.5, &[0.0, 7.0]) < 0.0);
        assert_eq!(margin(&normal, 0.5, &[0.5, -1.0]), 0.0);
    }

    #[test]
    fn test_tree_shape_queries() {
        let tree = small_tree();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.depth(), 3);
        assert!(!tree.root().is_leaf());

        let mut ids: Vec<u32> = tree.leaf_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = Tree::from_nodes(vec![Node::Leaf { ids: vec![0] }]);
        assert_eq!(tree.depth(), 1);
        assert!(tree.root().is_leaf());
    }

    #[test]
    fn test_forest_counts() {
        let forest = Forest::new(vec![small_tree(), small_tree()]);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.node_count(), 10);
        assert!(forest.tree(2).is_none());
    }
}
