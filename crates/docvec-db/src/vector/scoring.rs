//! Distance helpers and the distance-to-score convention.
//!
//! Raw indexes rank by a distance where lower is better. Callers only ever see
//! a score where higher is better:
//!
//! - cosine: `score = 1 - cosine_distance`, i.e. the cosine similarity
//! - l2: `score = 1 / (1 + euclidean_distance)`, in `(0, 1]`

use std::cmp::Ordering;

use super::config::VectorMetric;
use crate::document::SearchResult;

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute dot product between two vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute Euclidean (L2) distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Convert a raw distance into a caller-facing score.
pub fn score_from_distance(metric: VectorMetric, distance: f32) -> f32 {
    match metric {
        VectorMetric::Cosine => 1.0 - distance,
        VectorMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
    }
}

/// Sort hits by score descending, breaking ties by insertion order.
///
/// Each hit is paired with its insertion key (raw position or sequence
/// number); lower keys were inserted first.
pub fn rank_results(mut hits: Vec<(SearchResult, i64)>) -> Vec<SearchResult> {
    hits.sort_by(|(a, a_order), (b, b_order)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a_order.cmp(b_order))
    });
    hits.into_iter().map(|(hit, _)| hit).collect()
}

// ============================================================================
// Tests
// ============================================================================
