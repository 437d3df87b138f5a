//! Vector storage and operations
//!
//! - [`store::VectorStore`]: the dense, fixed-dimension table of embeddings an
//!   index is built from
//! - [`ops`]: similarity and distance functions (cosine, angular, L2)
//!
//! # Usage
//!
//! ```
//! use grove_core::vector::{VectorStore, cosine_similarity};
//!
//! let mut store = VectorStore::new(3);
//! let id = store.add(&[0.6, 0.8, 0.0]).unwrap();
//!
//! let similarity = cosine_similarity(store.get(id).unwrap(), &[0.6, 0.8, 0.0]).unwrap();
//! assert!((similarity - 1.0).abs() < 1e-6);
//! ```

pub mod ops;
pub mod store;

pub use ops::{angular_distance, cosine_similarity, dot_product, l2_distance, magnitude, normalize};
pub use store::VectorStore;
