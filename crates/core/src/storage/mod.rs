//! Persistence for indexes and chunk stores
//!
//! [`IndexStorage`] keeps named items in a directory, each as a compressed data
//! file plus a metadata sidecar. [`compression`] provides the framed codecs.

pub mod compression;
pub mod file;

pub use compression::{best_codec, compress, compress_with, decompress, Codec, CompressionStats};
pub use file::{IndexStorage, ItemType, StorageMetadata};
