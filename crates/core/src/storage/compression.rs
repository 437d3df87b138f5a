//! Compression of persisted index and chunk payloads
//!
//! Every compressed payload starts with a 4-byte frame header
//! `[codec_id, frame_version, 0, 0]` so [`decompress`] can pick the codec
//! without consulting the metadata sidecar.
//!
//! | codec  | id | availability        |
//! |--------|----|---------------------|
//! | none   | 0  | always              |
//! | gzip   | 1  | always (flate2)     |
//! | lz4    | 2  | `lz4` feature       |
//! | zstd   | 3  | `zstd` feature      |
//!
//! ```
//! use grove_core::storage::compression::{compress_with, decompress, Codec};
//!
//! let payload = b"angular forest ".repeat(64);
//! let (framed, stats) = compress_with(&payload, Codec::Gzip).unwrap();
//! assert!(stats.compressed_size < stats.original_size);
//! assert_eq!(decompress(&framed).unwrap(), payload);
//! ```

use std::io::{self, Read, Write};
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Compression codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Stored as is
    None,
    #[default]
    Gzip,
    #[cfg(feature = "lz4")]
    Lz4,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Codec {
    fn id(&self) -> u8 {
        match self {
            Codec::None => 0,
            Codec::Gzip => 1,
            #[cfg(feature = "lz4")]
            Codec::Lz4 => 2,
            #[cfg(feature = "zstd")]
            Codec::Zstd => 3,
        }
    }

    fn from_id(id: u8) -> Result<Self, CompressionError> {
        match id {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Gzip),
            #[cfg(feature = "lz4")]
            2 => Ok(Codec::Lz4),
            #[cfg(not(feature = "lz4"))]
            2 => Err(CompressionError::UnsupportedCodec("lz4 (feature disabled)".into())),
            #[cfg(feature = "zstd")]
            3 => Ok(Codec::Zstd),
            #[cfg(not(feature = "zstd"))]
            3 => Err(CompressionError::UnsupportedCodec("zstd (feature disabled)".into())),
            other => Err(CompressionError::InvalidHeader(format!("codec id {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
            #[cfg(feature = "lz4")]
            Codec::Lz4 => "lz4",
            #[cfg(feature = "zstd")]
            Codec::Zstd => "zstd",
        }
    }
}

impl FromStr for Codec {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Codec::None),
            "gzip" => Ok(Codec::Gzip),
            #[cfg(feature = "lz4")]
            "lz4" => Ok(Codec::Lz4),
            #[cfg(feature = "zstd")]
            "zstd" => Ok(Codec::Zstd),
            other => Err(CompressionError::UnsupportedCodec(other.to_string())),
        }
    }
}

/// Sizes and timing of one compression call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionStats {
    pub original_size: usize,
    /// Including the frame header
    pub compressed_size: usize,
    pub codec: Codec,
    pub duration_ms: f64,
}

impl CompressionStats {
    /// `original / compressed`; 0 for an empty output
    pub fn ratio(&self) -> f64 {
        if self.compressed_size == 0 {
            0.0
        } else {
            self.original_size as f64 / self.compressed_size as f64
        }
    }

    pub fn space_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
}

const FRAME_HEADER_LEN: usize = 4;
const FRAME_VERSION: u8 = 1;

/// Strongest codec compiled in: lz4, then zstd, then gzip
pub fn best_codec() -> Codec {
    #[cfg(feature = "lz4")]
    {
        return Codec::Lz4;
    }

    #[cfg(all(feature = "zstd", not(feature = "lz4")))]
    {
        return Codec::Zstd;
    }

    #[cfg(not(any(feature = "lz4", feature = "zstd")))]
    {
        Codec::Gzip
    }
}

/// Compress with [`best_codec`]
pub fn compress(data: &[u8]) -> Result<(Vec<u8>, CompressionStats), CompressionError> {
    compress_with(data, best_codec())
}

/// Compress with a specific codec, prefixing the frame header
pub fn compress_with(
    data: &[u8],
    codec: Codec,
) -> Result<(Vec<u8>, CompressionStats), CompressionError> {
    let start = Instant::now();

    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + data.len() / 2);
    framed.extend_from_slice(&[codec.id(), FRAME_VERSION, 0, 0]);

    match codec {
        Codec::None => framed.extend_from_slice(data),
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(&mut framed, flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?;
        }
        #[cfg(feature = "lz4")]
        Codec::Lz4 => {
            // Block format needs the decoded length up front
            framed.extend_from_slice(&(data.len() as u32).to_le_bytes());
            let block = lz4::block::compress(data, None, false)
                .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
            framed.extend_from_slice(&block);
        }
        #[cfg(feature = "zstd")]
        Codec::Zstd => {
            let encoded = zstd::encode_all(data, 3)
                .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
            framed.extend_from_slice(&encoded);
        }
    }

    let stats = CompressionStats {
        original_size: data.len(),
        compressed_size: framed.len(),
        codec,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    trace!(
        codec = codec.name(),
        original = stats.original_size,
        compressed = stats.compressed_size,
        "payload compressed"
    );
    Ok((framed, stats))
}

/// Decompress a framed payload, detecting the codec from its header
pub fn decompress(framed: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if framed.len() < FRAME_HEADER_LEN {
        return Err(CompressionError::InvalidHeader(format!(
            "{} bytes is shorter than the frame header",
            framed.len()
        )));
    }
    let codec = Codec::from_id(framed[0])?;
    if framed[1] != FRAME_VERSION {
        return Err(CompressionError::InvalidHeader(format!(
            "frame version {}",
            framed[1]
        )));
    }
    let body = &framed[FRAME_HEADER_LEN..];

    match codec {
        Codec::None => Ok(body.to_vec()),
        Codec::Gzip => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
            Ok(out)
        }
        #[cfg(feature = "lz4")]
        Codec::Lz4 => {
            if body.len() < 4 {
                return Err(CompressionError::DecompressionFailed(
                    "lz4 block is missing its length prefix".into(),
                ));
            }
            let len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
            let len = i32::try_from(len).map_err(|_| {
                CompressionError::DecompressionFailed(format!("lz4 block length {len} is too large"))
            })?;
            lz4::block::decompress(&body[4..], Some(len))
                .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))
        }
        #[cfg(feature = "zstd")]
        Codec::Zstd => zstd::decode_all(body)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string())),
    }
}
