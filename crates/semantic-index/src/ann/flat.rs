use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use core_types::GlyphId;
use serde::{Deserialize, Serialize};

use super::{AnnIndex, IndexError, Metric, Neighbor};

/// Name of the index root inside a dataset directory.
pub const INDEX_ROOT: &str = "anng";
/// File holding the vectors when [`INDEX_ROOT`] is a directory.
pub const INDEX_FILE: &str = "vectors.bin";

const MAGIC: [u8; 4] = *b"GFLT";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 4],
    version: u32,
    metric: Metric,
    dimension: u32,
    /// Row-major; row `i` is glyph id `i + 1`.
    vectors: Vec<f32>,
}

/// Exhaustive index over a dense row-major vector table.
///
/// Results are exact, so `epsilon` has no effect.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: Metric,
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Build an index from rows that all share the same length.
    pub fn build(metric: Metric, rows: &[Vec<f32>]) -> Result<Self, IndexError> {
        let dimension = rows.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(IndexError::Build("rows have no dimensions".into()));
        }
        let mut vectors = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            vectors.extend_from_slice(row);
        }
        Ok(Self {
            metric,
            dimension,
            vectors,
        })
    }

    /// Open an index from `path`, which is either the index file itself or a
    /// directory containing [`INDEX_FILE`].
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let file = resolve_file(path);
        let load_err = |reason: String| IndexError::Load {
            path: file.clone(),
            reason,
        };

        let bytes = fs::read(&file).map_err(|e| load_err(e.to_string()))?;
        let raw: IndexFile =
            bincode::deserialize(&bytes).map_err(|e| load_err(format!("malformed index: {e}")))?;

        if raw.magic != MAGIC {
            return Err(load_err("not a flat index file".into()));
        }
        if raw.version != FORMAT_VERSION {
            return Err(load_err(format!("unsupported format version {}", raw.version)));
        }
        let dimension = raw.dimension as usize;
        if dimension == 0 {
            return Err(load_err("index dimension is zero".into()));
        }
        if raw.vectors.len() % dimension != 0 {
            return Err(load_err(format!(
                "payload of {} values is not a multiple of dimension {dimension}",
                raw.vectors.len()
            )));
        }

        let index = Self {
            metric: raw.metric,
            dimension,
            vectors: raw.vectors,
        };
        tracing::debug!(
            path = %file.display(),
            dimension,
            items = index.len(),
            metric = ?index.metric,
            "flat index opened"
        );
        Ok(index)
    }

    /// Write the index to `path` in the format read by [`FlatIndex::open`].
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let save_err = |reason: String| IndexError::Save {
            path: path.to_path_buf(),
            reason,
        };
        let dimension = u32::try_from(self.dimension)
            .map_err(|_| save_err("dimension does not fit the format".into()))?;
        let raw = IndexFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            metric: self.metric,
            dimension,
            vectors: self.vectors.clone(),
        };
        let file = fs::File::create(path).map_err(|e| save_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &raw).map_err(|e| save_err(e.to_string()))?;
        writer.flush().map_err(|e| save_err(e.to_string()))
    }

    pub const fn metric(&self) -> Metric {
        self.metric
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension)
    }
}

impl AnnIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    fn search(&self, vector: &[f32], k: usize, _epsilon: f32) -> Result<Vec<Neighbor>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .rows()
            .enumerate()
            .map(|(i, row)| (self.metric.distance(vector, row), i))
            .collect();

        let by_distance = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
        };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        scored
            .into_iter()
            .map(|(distance, i)| {
                GlyphId::from_index(i)
                    .map(|id| Neighbor { id, distance })
                    .ok_or_else(|| IndexError::Search(format!("row {i} has no valid id")))
            })
            .collect()
    }
}

fn resolve_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(INDEX_FILE)
    } else {
        path.to_path_buf()
    }
}
