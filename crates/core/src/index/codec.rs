//! Binary index format
//!
//! Layout, all integers and floats little-endian:
//!
//! ```text
//! header   "GRVF" | version: u16 | metric: u8 | reserved: u8
//!          dimension: u32 | tree_count: u32 | leaf_capacity: u32 | vector_count: u32
//! vectors  vector_count * dimension f32, row-major
//! trees    tree_count times:
//!            node_count: u32, then node_count nodes in slot order
//!            tag 0 (leaf):  len: u32 | len u32 ids
//!            tag 1 (split): dimension f32 normal | offset: f32 | left: u32 | right: u32
//! ```
//!
//! [`load`] validates everything it reads and never panics on malformed
//! input: structural problems are `CorruptData`, an unknown version or metric
//! is `UnsupportedVersion`.

use super::tree::{Forest, Node, Tree};
use super::{AnnIndex, ForestConfig, Metric};
use crate::vector::VectorStore;
use crate::{GroveError, Result};

/// File magic
pub const MAGIC: [u8; 4] = *b"GRVF";
/// Current format version
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 4 * 4;
const TAG_LEAF: u8 = 0;
const TAG_SPLIT: u8 = 1;

/// Serialize an index into the binary format
pub fn save(index: &AnnIndex) -> Vec<u8> {
    let dimension = index.dimension();
    let store = index.store().as_flat();
    let mut out = Vec::with_capacity(HEADER_LEN + store.len() * 4 + index.forest().node_count() * 16);

    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(index.metric().id());
    out.push(0);
    put_u32(&mut out, dimension);
    put_u32(&mut out, index.forest().len());
    put_u32(&mut out, index.config().leaf_capacity);
    put_u32(&mut out, index.len());

    for value in store {
        out.extend_from_slice(&value.to_le_bytes());
    }

    for tree in index.forest().trees() {
        put_u32(&mut out, tree.len());
        for node in tree.nodes() {
            match node {
                Node::Leaf { ids } => {
                    out.push(TAG_LEAF);
                    put_u32(&mut out, ids.len());
                    for id in ids {
                        out.extend_from_slice(&id.to_le_bytes());
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    out.push(TAG_SPLIT);
                    for value in normal {
                        out.extend_from_slice(&value.to_le_bytes());
                    }
                    out.extend_from_slice(&offset.to_le_bytes());
                    out.extend_from_slice(&left.to_le_bytes());
                    out.extend_from_slice(&right.to_le_bytes());
                }
            }
        }
    }

    out
}

/// Parse and validate an index from the binary format
///
/// The returned index reports the persisted tree count, leaf capacity and
/// metric; build-only settings take their defaults.
pub fn load(bytes: &[u8]) -> Result<AnnIndex> {
    let mut reader = Reader::new(bytes);

    if reader.take(4)? != MAGIC {
        return Err(GroveError::CorruptData("bad magic".into()));
    }
    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(GroveError::UnsupportedVersion(format!(
            "index format version {version} (expected {FORMAT_VERSION})"
        )));
    }
    let metric = Metric::from_id(reader.u8()?)?;
    let _reserved = reader.u8()?;

    let dimension = reader.u32()? as usize;
    let tree_count = reader.u32()? as usize;
    let leaf_capacity = reader.u32()? as usize;
    let vector_count = reader.u32()?;

    if dimension == 0 {
        return Err(corrupt("dimension is zero"));
    }
    if tree_count == 0 {
        return Err(corrupt("tree count is zero"));
    }
    if leaf_capacity == 0 {
        return Err(corrupt("leaf capacity is zero"));
    }
    if vector_count == 0 {
        return Err(corrupt("index holds no vectors"));
    }

    let floats = (vector_count as usize)
        .checked_mul(dimension)
        .ok_or_else(|| corrupt("vector table size overflows"))?;
    let data = reader.f32_vec(floats)?;
    let store = VectorStore::from_flat(dimension, data)?;

    let mut trees = Vec::with_capacity(tree_count.min(reader.remaining() / 5));
    for tree_index in 0..tree_count {
        let tree = decode_tree(&mut reader, dimension, leaf_capacity, vector_count)
            .map_err(|e| match e {
                GroveError::CorruptData(msg) => {
                    GroveError::CorruptData(format!("tree {tree_index}: {msg}"))
                }
                other => other,
            })?;
        trees.push(tree);
    }

    if reader.remaining() != 0 {
        return Err(corrupt(format!("{} trailing bytes", reader.remaining())));
    }

    let config = ForestConfig {
        tree_count,
        leaf_capacity,
        metric,
        ..ForestConfig::default()
    };
    Ok(AnnIndex::from_parts(store, Forest::new(trees), config))
}

fn decode_tree(
    reader: &mut Reader<'_>,
    dimension: usize,
    leaf_capacity: usize,
    vector_count: u32,
) -> Result<Tree> {
    let node_count = reader.u32()? as usize;
    if node_count == 0 {
        return Err(corrupt("empty tree"));
    }
    // Smallest node is a tag plus a u32
    if node_count > reader.remaining() / 5 {
        return Err(corrupt(format!("node count {node_count} exceeds remaining data")));
    }

    let mut nodes = Vec::with_capacity(node_count);
    for slot in 0..node_count {
        let node = match reader.u8()? {
            TAG_LEAF => {
                let len = reader.u32()? as usize;
                if len > leaf_capacity {
                    return Err(corrupt(format!(
                        "leaf at slot {slot} holds {len} ids, capacity is {leaf_capacity}"
                    )));
                }
                if len > reader.remaining() / 4 {
                    return Err(corrupt(format!(
                        "leaf at slot {slot} holds {len} ids, exceeds remaining data"
                    )));
                }
                let mut ids = Vec::with_capacity(len);
                for _ in 0..len {
                    let id = reader.u32()?;
                    if id >= vector_count {
                        return Err(corrupt(format!(
                            "leaf at slot {slot} references id {id} of {vector_count}"
                        )));
                    }
                    ids.push(id);
                }
                Node::Leaf { ids }
            }
            TAG_SPLIT => {
                let normal = reader.f32_vec(dimension)?;
                let offset = reader.f32()?;
                let left = reader.u32()?;
                let right = reader.u32()?;
                for child in [left, right] {
                    if child as usize >= node_count || child as usize <= slot {
                        return Err(corrupt(format!(
                            "split at slot {slot} has invalid child {child}"
                        )));
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                }
            }
            tag => return Err(corrupt(format!("unknown node tag {tag} at slot {slot}"))),
        };
        nodes.push(node);
    }

    Ok(Tree::from_nodes(nodes))
}

fn corrupt(msg: impl Into<String>) -> GroveError {
    GroveError::CorruptData(msg.into())
}

/// Encoder callers have already bounded these counts to `u32`
fn put_u32(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&(value as u32).to_le_bytes());
}

/// Bounds-checked little-endian cursor
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(corrupt(format!(
                "truncated at byte {}: need {len}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f32_vec(&mut self, len: usize) -> Result<Vec<f32>> {
        let byte_len = len
            .checked_mul(4)
            .ok_or_else(|| corrupt("float array size overflows"))?;
        let raw = self.take(byte_len)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ForestBuilder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample_index(metric: Metric) -> AnnIndex {
        let mut rng = StdRng::seed_from_u64(21);
        let mut store = VectorStore::new(6);
        for _ in 0..120 {
            let v: Vec<f32> = (0..6).map(|_| rng.gen_range(-1.0..1.0)).collect();
            store.add(&v).unwrap();
        }
        let config = ForestConfig::default()
            .with_tree_count(4)
            .with_leaf_capacity(7)
            .with_metric(metric)
            .with_seed(5);
        ForestBuilder::new(config).build(store).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_structure_and_results() {
        for metric in [Metric::Angular, Metric::Euclidean] {
            let index = sample_index(metric);
            let decoded = load(&save(&index)).unwrap();

            assert_eq!(decoded.store(), index.store());
            assert_eq!(decoded.forest(), index.forest());
            assert_eq!(decoded.metric(), metric);
            assert_eq!(decoded.config().leaf_capacity, 7);
            assert_eq!(decoded.config().tree_count, 4);

            let query = index.store().get(17).unwrap().to_vec();
            assert_eq!(
                decoded.search(&query, 5, 200).unwrap(),
                index.search(&query, 5, 200).unwrap()
            );
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = save(&sample_index(Metric::Euclidean));
        assert_eq!(&bytes[0..4], b"GRVF");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
        assert_eq!(bytes[6], Metric::Euclidean.id());
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 6);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 7);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 120);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = save(&sample_index(Metric::Angular));
        bytes[0] = b'X';
        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }

    #[test]
    fn test_unknown_version_and_metric() {
        let mut bytes = save(&sample_index(Metric::Angular));
        bytes[4] = 9;
        assert!(matches!(load(&bytes), Err(GroveError::UnsupportedVersion(_))));

        let mut bytes = save(&sample_index(Metric::Angular));
        bytes[6] = 77;
        assert!(matches!(load(&bytes), Err(GroveError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = save(&sample_index(Metric::Angular));
        for len in (0..bytes.len()).step_by(37) {
            assert!(
                matches!(load(&bytes[..len]), Err(GroveError::CorruptData(_))),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = save(&sample_index(Metric::Angular));
        bytes.push(0);
        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut bytes = save(&sample_index(Metric::Angular));
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }

    #[test]
    fn test_out_of_range_leaf_id_rejected() {
        let mut store = VectorStore::new(2);
        store.add(&[1.0, 0.0]).unwrap();
        let index = ForestBuilder::new(ForestConfig::default().with_tree_count(1))
            .build(store)
            .unwrap();
        let mut bytes = save(&index);

        // header, one vector, node_count, tag, len, then the single id
        let id_at = HEADER_LEN + 8 + 4 + 1 + 4;
        bytes[id_at..id_at + 4].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }

    #[test]
    fn test_oversized_leaf_length_rejected_before_allocating() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.push(Metric::Euclidean.id());
        bytes.push(0);
        for header in [1u32, 1, u32::MAX, 1] {
            bytes.extend_from_slice(&header.to_le_bytes());
        }
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_LEAF);
        bytes.extend_from_slice(&(u32::MAX - 1).to_le_bytes());
        assert_eq!(bytes.len(), 37);

        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut store = VectorStore::new(2);
        store.add(&[1.0, 0.0]).unwrap();
        let index = ForestBuilder::new(ForestConfig::default().with_tree_count(1))
            .build(store)
            .unwrap();
        let mut bytes = save(&index);
        bytes[HEADER_LEN + 8 + 4] = 3;
        assert!(matches!(load(&bytes), Err(GroveError::CorruptData(_))));
    }
}
