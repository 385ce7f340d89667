use dataset::LabelTable;
use protocol::SearchHit;
use semantic_index::AnnIndex;

use crate::error::SearchError;

/// Run a k-NN query and label each hit.
///
/// The index ranking is kept as returned; ids outside the label table mean
/// the index and labels do not belong together and fail the whole request.
pub fn execute(
    index: &dyn AnnIndex,
    labels: &LabelTable,
    vector: &[f32],
    k: usize,
    epsilon: f32,
) -> Result<Vec<SearchHit>, SearchError> {
    let neighbors = index.search(vector, k, epsilon)?;

    neighbors
        .into_iter()
        .map(|n| match labels.label_for(n.id) {
            Some(label) => Ok(SearchHit {
                label: label.to_string(),
                distance: n.distance,
            }),
            None => {
                tracing::error!(
                    id = n.id.0,
                    labels = labels.len(),
                    "index returned an id outside the label table"
                );
                Err(SearchError::LabelIndexOutOfRange {
                    id: n.id.0,
                    labels: labels.len(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core_types::GlyphId;
    use parking_lot::Mutex;
    use semantic_index::{IndexError, Neighbor};

    /// Index double returning canned neighbours and recording queries.
    pub(crate) struct ScriptedIndex {
        pub dimension: usize,
        pub hits: Vec<(u32, f32)>,
        pub queries: Mutex<Vec<Vec<f32>>>,
    }

    impl ScriptedIndex {
        pub(crate) fn new(dimension: usize, hits: &[(u32, f32)]) -> Self {
            Self {
                dimension,
                hits: hits.to_vec(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnnIndex for ScriptedIndex {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn len(&self) -> usize {
            self.hits.len()
        }

        fn search(&self, vector: &[f32], k: usize, _epsilon: f32) -> Result<Vec<Neighbor>, IndexError> {
            self.queries.lock().push(vector.to_vec());
            Ok(self
                .hits
                .iter()
                .take(k)
                .map(|&(id, distance)| Neighbor {
                    id: GlyphId(id),
                    distance,
                })
                .collect())
        }
    }

    fn greek() -> LabelTable {
        LabelTable::new(vec!["α".into(), "β".into(), "γ".into()])
    }

    #[test]
    fn maps_ids_to_labels_in_index_order() {
        let index = ScriptedIndex::new(2, &[(2, 0.3), (1, 0.9)]);
        let hits = execute(&index, &greek(), &[0.1, 0.0], 20, 0.1).unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    label: "β".into(),
                    distance: 0.3
                },
                SearchHit {
                    label: "α".into(),
                    distance: 0.9
                },
            ]
        );
        assert_eq!(index.queries.lock().as_slice(), &[vec![0.1f32, 0.0]]);
    }

    #[test]
    fn out_of_range_id_is_an_error() {
        let index = ScriptedIndex::new(2, &[(1, 0.1), (4, 0.2)]);
        let err = execute(&index, &greek(), &[0.0, 0.0], 20, 0.1).unwrap_err();
        assert!(matches!(
            err,
            SearchError::LabelIndexOutOfRange { id: 4, labels: 3 }
        ));
    }

    #[test]
    fn id_zero_is_out_of_range() {
        let index = ScriptedIndex::new(1, &[(0, 0.0)]);
        assert!(execute(&index, &greek(), &[0.0], 20, 0.1).is_err());
    }
}
