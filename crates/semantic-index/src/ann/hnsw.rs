//! Approximate search over an HNSW graph built from a [`FlatIndex`].

use core_types::GlyphId;
use hnsw_rs::prelude::*;

use super::flat::FlatIndex;
use super::{AnnIndex, IndexError, Metric, Neighbor};

const MAX_NB_CONNECTION: usize = 32;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 100;
/// Candidate list entries per requested neighbour at `epsilon == 0`.
const EF_PER_RESULT: f32 = 4.0;

enum Graph {
    L2(Hnsw<'static, f32, DistL2>),
    L1(Hnsw<'static, f32, DistL1>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

/// HNSW graph over the rows of a flat index.
///
/// `epsilon` widens the search: the candidate list (`ef`) grows with
/// `1 + epsilon`, trading speed for recall.
pub struct HnswIndex {
    graph: Graph,
    metric: Metric,
    dimension: usize,
    len: usize,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("metric", &self.metric)
            .field("dimension", &self.dimension)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

fn build_graph<D>(flat: &FlatIndex, distance: D) -> Hnsw<'static, f32, D>
where
    D: Distance<f32> + Send + Sync,
{
    let graph = Hnsw::new(
        MAX_NB_CONNECTION,
        flat.len().max(1),
        MAX_LAYER,
        EF_CONSTRUCTION,
        distance,
    );
    for (i, row) in flat.rows().enumerate() {
        graph.insert((row, i));
    }
    graph
}

impl HnswIndex {
    pub fn from_flat(flat: &FlatIndex) -> Result<Self, IndexError> {
        if flat.is_empty() {
            return Err(IndexError::Build("no vectors to link".into()));
        }
        let metric = flat.metric();
        let graph = match metric {
            Metric::L2 => Graph::L2(build_graph(flat, DistL2 {})),
            Metric::L1 => Graph::L1(build_graph(flat, DistL1 {})),
            Metric::Cosine => Graph::Cosine(build_graph(flat, DistCosine {})),
        };
        tracing::debug!(items = flat.len(), ?metric, "hnsw graph built");
        Ok(Self {
            graph,
            metric,
            dimension: flat.dimension(),
            len: flat.len(),
        })
    }
}

/// Search breadth for `k` results at the given `epsilon`; never below `k`.
pub fn ef_for(k: usize, epsilon: f32) -> usize {
    let widen = (1.0 + epsilon).max(0.0);
    let ef = (k as f32 * EF_PER_RESULT * widen).ceil() as usize;
    ef.max(k)
}

impl AnnIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.len
    }

    fn search(&self, vector: &[f32], k: usize, epsilon: f32) -> Result<Vec<Neighbor>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let ef = ef_for(k, epsilon);
        let mut found = match &self.graph {
            Graph::L2(g) => g.search(vector, k, ef),
            Graph::L1(g) => g.search(vector, k, ef),
            Graph::Cosine(g) => g.search(vector, k, ef),
        };
        found.sort_unstable_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.d_id.cmp(&b.d_id))
        });
        found.truncate(k);

        found
            .into_iter()
            .map(|n| {
                GlyphId::from_index(n.d_id)
                    .map(|id| Neighbor {
                        id,
                        distance: n.distance,
                    })
                    .ok_or_else(|| IndexError::Search(format!("row {} has no valid id", n.d_id)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> FlatIndex {
        let rows: Vec<Vec<f32>> = (0..10)
            .flat_map(|x| (0..10).map(move |y| vec![x as f32, y as f32]))
            .collect();
        FlatIndex::build(Metric::L2, &rows).unwrap()
    }

    #[test]
    fn small_graph_matches_exact_search() {
        let flat = grid();
        let hnsw = HnswIndex::from_flat(&flat).unwrap();
        assert_eq!(hnsw.len(), 100);

        let query = [3.2, 6.9];
        let exact = flat.search(&query, 5, 0.1).unwrap();
        let approx = hnsw.search(&query, 5, 0.1).unwrap();
        assert_eq!(approx[0].id, exact[0].id);
        assert!((approx[0].distance - exact[0].distance).abs() < 1e-4);
        assert!(approx.len() <= 5);
        assert!(approx.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn epsilon_widens_the_candidate_list() {
        assert_eq!(ef_for(20, 0.0), 80);
        assert!(ef_for(20, 0.1) > ef_for(20, 0.0));
        assert!(ef_for(20, 1.0) > ef_for(20, 0.1));
        assert_eq!(ef_for(20, -5.0), 20);
        assert_eq!(ef_for(0, 0.1), 0);
    }

    #[test]
    fn rejects_wrong_dimension_and_empty_input() {
        let hnsw = HnswIndex::from_flat(&grid()).unwrap();
        assert!(matches!(
            hnsw.search(&[1.0], 3, 0.1),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(hnsw.search(&[1.0, 1.0], 0, 0.1).unwrap().is_empty());
    }
}
