pub mod flat;
#[cfg(feature = "hnsw_rs")]
pub mod hnsw;

use std::path::PathBuf;

use core_types::{Distance, GlyphId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One ranked hit returned by an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: GlyphId,
    pub distance: Distance,
}

/// Distance function stored alongside the vectors. Lower is always closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    L2,
    L1,
    Cosine,
}

impl Metric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> Distance {
        match self {
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Self::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (na.sqrt() * nb.sqrt())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index at {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("cannot build index: {0}")]
    Build(String),
    #[error("failed to write index to {path}: {reason}")]
    Save { path: PathBuf, reason: String },
    #[error("query has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index search failed: {0}")]
    Search(String),
}

/// Read-only nearest-neighbour index.
///
/// Implementations return at most `k` neighbours ordered by ascending
/// distance, with 1-based [`GlyphId`]s. `epsilon` trades recall for speed and
/// is opaque to callers; exact implementations may ignore it.
pub trait AnnIndex: Send + Sync {
    fn dimension(&self) -> usize;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, vector: &[f32], k: usize, epsilon: f32) -> Result<Vec<Neighbor>, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_agree_on_simple_vectors() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((Metric::L2.distance(&a, &b) - 5.0).abs() < 1e-6);
        assert!((Metric::L1.distance(&a, &b) - 7.0).abs() < 1e-6);
        assert!((Metric::Cosine.distance(&b, &b)).abs() < 1e-6);
        // zero vector has no direction
        assert!((Metric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
    }
}
