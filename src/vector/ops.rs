// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pure vector math: serialization, quantization, distances, and the
//! distance-to-similarity mappings the rest of the pipeline depends on.
//!
//! All functions are deterministic; the similarity mappings are contractual
//! and covered by tests.

use crate::error::StoreError;

use super::types::{DistanceMetric, VectorType};

/// Serialize a vector to bytes under the given encoding.
///
/// Float32 is little-endian IEEE-754; int8 clamps each component to
/// [-128, 127]; binary packs 8 components per byte with bit *i* set iff the
/// component is positive.
pub fn serialize(vec: &[f32], vector_type: VectorType) -> Vec<u8> {
    match vector_type {
        VectorType::Float32 => vec.iter().flat_map(|f| f.to_le_bytes()).collect(),
        VectorType::Int8 => vec
            .iter()
            .map(|&v| (v.round().clamp(-128.0, 127.0) as i8) as u8)
            .collect(),
        VectorType::Binary => {
            let mut bytes = vec![0u8; vec.len().div_ceil(8)];
            for (i, &v) in vec.iter().enumerate() {
                if v > 0.0 {
                    bytes[i / 8] |= 1 << (i % 8);
                }
            }
            bytes
        }
    }
}

/// Deserialize bytes back into a vector.
///
/// Float32 round-trips exactly. Int8 yields the stored byte values as f32.
/// Binary yields +1.0 for set bits and -1.0 otherwise, preserving the sign
/// information the encoding kept.
pub fn deserialize(bytes: &[u8], vector_type: VectorType, dimensions: usize) -> Result<Vec<f32>, StoreError> {
    match vector_type {
        VectorType::Float32 => {
            if bytes.len() != dimensions * 4 {
                return Err(StoreError::InvalidDimensions {
                    expected: dimensions,
                    actual: bytes.len() / 4,
                });
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|chunk| {
                    let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
                    f32::from_le_bytes(arr)
                })
                .collect())
        }
        VectorType::Int8 => {
            if bytes.len() != dimensions {
                return Err(StoreError::InvalidDimensions {
                    expected: dimensions,
                    actual: bytes.len(),
                });
            }
            Ok(bytes.iter().map(|&b| (b as i8) as f32).collect())
        }
        VectorType::Binary => {
            if bytes.len() != dimensions.div_ceil(8) {
                return Err(StoreError::InvalidDimensions {
                    expected: dimensions,
                    actual: bytes.len() * 8,
                });
            }
            Ok((0..dimensions)
                .map(|i| {
                    if bytes[i / 8] & (1 << (i % 8)) != 0 {
                        1.0
                    } else {
                        -1.0
                    }
                })
                .collect())
        }
    }
}

/// Normalize a vector to unit L2 length. Zero vectors are returned unchanged.
pub fn normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec.to_vec();
    }
    vec.iter().map(|x| x / norm).collect()
}

/// Quantize to the 1-bit encoding.
pub fn quantize_binary(vec: &[f32]) -> Vec<u8> {
    serialize(vec, VectorType::Binary)
}

/// Quantize to int8 via an affine map of [min, max] onto [-127, 127].
///
/// When `min == max == 0.0` the range is derived from the vector itself.
/// A degenerate range maps everything to zero.
pub fn quantize_int8(vec: &[f32], min: f32, max: f32) -> Vec<u8> {
    let (min, max) = if min == 0.0 && max == 0.0 {
        vec.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
    } else {
        (min, max)
    };

    let range = max - min;
    vec.iter()
        .map(|&v| {
            if range == 0.0 || !range.is_finite() {
                0u8
            } else {
                let scaled = ((v - min) / range) * 254.0 - 127.0;
                (scaled.round().clamp(-127.0, 127.0) as i8) as u8
            }
        })
        .collect()
}

/// Slice a vector to `[a, b)` for Matryoshka-style adaptive dimensions.
pub fn slice(vec: &[f32], a: usize, b: usize) -> Result<Vec<f32>, StoreError> {
    if a >= b || b > vec.len() {
        return Err(StoreError::InvalidVector(format!(
            "invalid slice bounds [{}, {}) for vector of length {}",
            a,
            b,
            vec.len()
        )));
    }
    Ok(vec[a..b].to_vec())
}

/// Raw distance between two vectors under a metric.
///
/// Cosine and L2 require equal dimensions; Hamming first quantizes both
/// sides to 1-bit.
pub fn distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> Result<f32, StoreError> {
    if a.len() != b.len() {
        return Err(StoreError::InvalidDimensions {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if a.is_empty() {
        return Err(StoreError::InvalidVector("empty vector".to_string()));
    }

    match metric {
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                // Maximally distant from everything, including itself.
                return Ok(2.0);
            }
            Ok(1.0 - dot / (norm_a * norm_b))
        }
        DistanceMetric::L2 => Ok(a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()),
        DistanceMetric::Hamming => {
            let qa = quantize_binary(a);
            let qb = quantize_binary(b);
            let bits: u32 = qa
                .iter()
                .zip(qb.iter())
                .map(|(x, y)| (x ^ y).count_ones())
                .sum();
            Ok(bits as f32)
        }
    }
}

/// Map a raw distance into a similarity in [0, 1], 1 = identical.
///
/// The mappings are contractual:
/// cosine `1 - d/2` clamped, L2 `1/(1+d)`, Hamming `1/(1 + d/10)`.
pub fn distance_to_similarity(d: f32, metric: DistanceMetric) -> f32 {
    match metric {
        DistanceMetric::Cosine => (1.0 - d / 2.0).clamp(0.0, 1.0),
        DistanceMetric::L2 => 1.0 / (1.0 + d),
        DistanceMetric::Hamming => 1.0 / (1.0 + d / 10.0),
    }
}

/// Brute-force K nearest neighbours.
///
/// Returns up to `k` `(id, distance)` pairs sorted ascending by distance.
/// Candidates with mismatched dimensions are skipped.
pub fn knn<I>(query: &[f32], candidates: I, k: usize, metric: DistanceMetric) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = (String, Vec<f32>)>,
{
    let mut scored: Vec<(String, f32)> = candidates
        .into_iter()
        .filter_map(|(id, vec)| distance(query, &vec, metric).ok().map(|d| (id, d)))
        .collect();

    scored.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}
