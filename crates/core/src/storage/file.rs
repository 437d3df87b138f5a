//! Directory-backed storage for indexes and chunk stores
//!
//! Each stored item is a pair of files:
//!
//! ```text
//! base_path/
//! ├── wiki.data      # frame header + compressed payload
//! └── wiki.meta      # bincode StorageMetadata
//! ```
//!
//! Index payloads use the binary layout from [`crate::index::codec`]; chunk
//! stores are a JSON array. Both files are written to a `.tmp` sibling first and
//! renamed into place, so a crash mid-write leaves the previous version intact.
//!
//! # Examples
//!
//! ```no_run
//! use grove_core::storage::{Codec, IndexStorage};
//!
//! # fn main() -> grove_core::Result<()> {
//! let storage = IndexStorage::with_codec("/var/lib/grove", Codec::Gzip)?;
//! let index = storage.load_index("wiki")?;
//! let chunks = storage.load_chunks("wiki-chunks")?;
//! println!("{} vectors, {} chunks", index.len(), chunks.len());
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunk::ChunkStore;
use crate::index::{codec, AnnIndex};
use crate::storage::compression::{self, Codec, CompressionStats};
use crate::{GroveError, Result};

pub const STORAGE_VERSION: u32 = 1;
const DATA_EXTENSION: &str = "data";
const META_EXTENSION: &str = "meta";
const TMP_EXTENSION: &str = "tmp";

/// Kind of payload held by a stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    ForestIndex,
    ChunkStore,
}

impl ItemType {
    pub fn name(&self) -> &'static str {
        match self {
            ItemType::ForestIndex => "forest_index",
            ItemType::ChunkStore => "chunk_store",
        }
    }
}

/// Sidecar describing one stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub version: u32,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds
    pub updated_at: u64,
    pub item_type: ItemType,
    pub compression: Codec,
    pub original_size: usize,
    /// Size of the `.data` file, frame header included
    pub compressed_size: usize,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Named, compressed, versioned items in one directory
#[derive(Debug, Clone)]
pub struct IndexStorage {
    base_path: PathBuf,
    codec: Codec,
}

impl IndexStorage {
    /// Open (creating if needed) a storage directory with the default codec
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_codec(base_path, Codec::default())
    }

    /// Open a storage directory that writes with `codec`
    ///
    /// Reads always detect the codec from the data file, so a directory can
    /// hold items written with different codecs.
    ///
    /// # Errors
    /// * `Storage` - If the directory cannot be created or the path is a file
    pub fn with_codec(base_path: impl AsRef<Path>, codec: Codec) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                GroveError::Storage(format!(
                    "cannot create storage directory {}: {e}",
                    base_path.display()
                ))
            })?;
        }
        if !base_path.is_dir() {
            return Err(GroveError::Storage(format!(
                "storage path is not a directory: {}",
                base_path.display()
            )));
        }
        Ok(Self { base_path, codec })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Persist an index under `name`
    pub fn save_index(&self, name: &str, index: &AnnIndex) -> Result<CompressionStats> {
        let payload = codec::save(index);
        let stats = self.save_item(name, &payload, ItemType::ForestIndex)?;
        info!(
            name,
            vectors = index.len(),
            trees = index.forest().len(),
            bytes = stats.compressed_size,
            "index saved"
        );
        Ok(stats)
    }

    /// Load and validate the index stored under `name`
    pub fn load_index(&self, name: &str) -> Result<AnnIndex> {
        let payload = self.load_item(name, ItemType::ForestIndex)?;
        let index = codec::load(&payload)?;
        info!(
            name,
            vectors = index.len(),
            dimension = index.dimension(),
            trees = index.forest().len(),
            "index loaded"
        );
        Ok(index)
    }

    /// Persist a chunk store under `name`
    pub fn save_chunks(&self, name: &str, chunks: &ChunkStore) -> Result<CompressionStats> {
        let payload = serde_json::to_vec(chunks)
            .map_err(|e| GroveError::Storage(format!("chunk serialization failed: {e}")))?;
        let stats = self.save_item(name, &payload, ItemType::ChunkStore)?;
        info!(name, chunks = chunks.len(), "chunks saved");
        Ok(stats)
    }

    /// Load the chunk store saved under `name`
    pub fn load_chunks(&self, name: &str) -> Result<ChunkStore> {
        let payload = self.load_item(name, ItemType::ChunkStore)?;
        let chunks: ChunkStore = serde_json::from_slice(&payload)
            .map_err(|e| GroveError::CorruptData(format!("chunk store {name}: {e}")))?;
        info!(name, chunks = chunks.len(), "chunks loaded");
        Ok(chunks)
    }

    /// Remove both files of an item; missing files are not an error
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        for path in [self.data_path(name), self.meta_path(name)] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    GroveError::Storage(format!("cannot delete {}: {e}", path.display()))
                })?;
            }
        }
        Ok(())
    }

    /// Names of stored items, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            GroveError::Storage(format!("cannot read storage directory: {e}"))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == META_EXTENSION) {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.data_path(name).exists() && self.meta_path(name).exists()
    }

    /// Read an item's metadata sidecar
    pub fn get_metadata(&self, name: &str) -> Result<StorageMetadata> {
        validate_name(name)?;
        let path = self.meta_path(name);
        if !path.exists() {
            return Err(GroveError::Storage(format!("no item named {name}")));
        }
        let bytes = fs::read(&path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Bytes used by every file in the directory
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.base_path)? {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }

    fn save_item(&self, name: &str, payload: &[u8], item_type: ItemType) -> Result<CompressionStats> {
        validate_name(name)?;
        let (framed, stats) = compression::compress_with(payload, self.codec)?;

        let now = unix_now();
        let created_at = match self.get_metadata(name) {
            Ok(previous) => previous.created_at,
            Err(_) => now,
        };
        let metadata = StorageMetadata {
            version: STORAGE_VERSION,
            created_at,
            updated_at: now,
            item_type,
            compression: stats.codec,
            original_size: stats.original_size,
            compressed_size: stats.compressed_size,
        };

        self.write_atomic(&self.data_path(name), &framed)?;
        self.write_atomic(&self.meta_path(name), &bincode::serialize(&metadata)?)?;
        debug!(
            name,
            item_type = item_type.name(),
            codec = stats.codec.name(),
            original = stats.original_size,
            compressed = stats.compressed_size,
            "item written"
        );
        Ok(stats)
    }

    fn load_item(&self, name: &str, expected: ItemType) -> Result<Vec<u8>> {
        if !self.exists(name) {
            return Err(GroveError::Storage(format!("no item named {name}")));
        }

        let metadata = self.get_metadata(name)?;
        if metadata.version != STORAGE_VERSION {
            return Err(GroveError::UnsupportedVersion(format!(
                "storage version {} (expected {STORAGE_VERSION})",
                metadata.version
            )));
        }
        if metadata.item_type != expected {
            return Err(GroveError::Storage(format!(
                "{name} holds a {}, not a {}",
                metadata.item_type.name(),
                expected.name()
            )));
        }

        let framed = fs::read(self.data_path(name))?;
        if framed.len() != metadata.compressed_size {
            return Err(GroveError::CorruptData(format!(
                "{name}: data file is {} bytes, metadata records {}",
                framed.len(),
                metadata.compressed_size
            )));
        }

        let payload = compression::decompress(&framed)?;
        if payload.len() != metadata.original_size {
            return Err(GroveError::CorruptData(format!(
                "{name}: payload is {} bytes, metadata records {}",
                payload.len(),
                metadata.original_size
            )));
        }
        Ok(payload)
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.{DATA_EXTENSION}"))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.{META_EXTENSION}"))
    }

    /// Write to `<path>.tmp`, fsync, then rename over `path`
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension(TMP_EXTENSION);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            GroveError::Io(e)
        })
    }
}

/// Item names become file stems, so they must stay inside the directory
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(GroveError::Storage(format!("invalid item name {name:?}")))
    }
}
