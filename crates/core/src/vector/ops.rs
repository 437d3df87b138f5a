//! Vector operations for the forest index
//!
//! Similarity and distance functions shared by the tree builder, the searcher and
//! the retrieval layer. The checked variants validate dimensions and return
//! [`GroveError::DimensionMismatch`]; the `_unchecked` helpers are for hot loops
//! whose callers already validated lengths.

use crate::{GroveError, Result};

/// Computes the cosine similarity between two vectors.
///
/// Returns a value in the range [-1, 1] where:
/// - 1.0 indicates identical direction
/// - 0.0 indicates orthogonal vectors (or a zero vector)
/// - -1.0 indicates opposite direction
///
/// # Errors
///
/// Returns `GroveError::DimensionMismatch` if the vectors have different dimensions.
///
/// # Examples
///
/// ```
/// use grove_core::vector::ops::cosine_similarity;
///
/// let a = vec![1.0, 0.0, 0.0];
/// let b = vec![0.0, 1.0, 0.0];
/// let similarity = cosine_similarity(&a, &b).unwrap();
/// assert!((similarity - 0.0).abs() < 1e-6);
/// ```
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(cosine_similarity_unchecked(a, b))
}

/// Computes the angular distance `sqrt(2 - 2 * cos(a, b))`.
///
/// This is the Euclidean distance between the two vectors after normalizing
/// both to unit length, so it lies in [0, 2].
///
/// # Examples
///
/// ```
/// use grove_core::vector::ops::angular_distance;
///
/// let a = vec![1.0, 0.0];
/// let b = vec![-3.0, 0.0];
/// let distance = angular_distance(&a, &b).unwrap();
/// assert!((distance - 2.0).abs() < 1e-6);
/// ```
#[inline]
pub fn angular_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(angular_distance_unchecked(a, b))
}

/// Computes the Euclidean (L2) distance between two vectors.
///
/// # Examples
///
/// ```
/// use grove_core::vector::ops::l2_distance;
///
/// let a = vec![0.0, 0.0];
/// let b = vec![3.0, 4.0];
/// let distance = l2_distance(&a, &b).unwrap();
/// assert!((distance - 5.0).abs() < 1e-6);
/// ```
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(l2_distance_unchecked(a, b))
}

/// Computes the dot product of two vectors.
///
/// # Examples
///
/// ```
/// use grove_core::vector::ops::dot_product;
///
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![4.0, 5.0, 6.0];
/// let product = dot_product(&a, &b).unwrap();
/// assert!((product - 32.0).abs() < 1e-6);
/// ```
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(dot_product_unchecked(a, b))
}

/// Normalizes a vector to unit length in place.
///
/// Zero and empty vectors are left unchanged.
///
/// # Examples
///
/// ```
/// use grove_core::vector::ops::normalize;
///
/// let mut v = vec![3.0, 4.0];
/// normalize(&mut v);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = magnitude(vector);
    if norm == 0.0 {
        return;
    }

    let inv_norm = 1.0 / norm;
    for x in vector.iter_mut() {
        *x *= inv_norm;
    }
}

/// Computes the L2 norm of a vector.
#[inline]
pub fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product without a length check.
///
/// Callers must pass slices of equal length; extra components of the longer
/// slice are ignored.
#[inline(always)]
pub fn dot_product_unchecked(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline(always)]
pub(crate) fn cosine_similarity_unchecked(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product_unchecked(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[inline(always)]
pub(crate) fn angular_distance_unchecked(a: &[f32], b: &[f32]) -> f32 {
    let cos = cosine_similarity_unchecked(a, b);
    (2.0 - 2.0 * cos).max(0.0).sqrt()
}

#[inline(always)]
pub(crate) fn l2_distance_unchecked(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

#[inline]
fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(GroveError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}
