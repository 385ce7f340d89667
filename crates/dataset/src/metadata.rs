use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Optional metadata file inside a dataset directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Descriptive fields written by the index build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetMeta {
    /// Dataset version clients pin their feature extractor to.
    pub v: Option<String>,
    /// Feature vector dimension the index was built with.
    pub dimen: Option<usize>,
    pub num_items: Option<usize>,
    /// Unix timestamp (seconds) of the glyph dump the dataset was built from.
    pub dump_time: Option<i64>,
    pub metric: Option<String>,
}

/// Read `metadata.json` from a dataset directory. A missing file is not an
/// error; older datasets ship without one.
pub fn load_metadata(dir: &Path) -> Result<Option<DatasetMeta>, DatasetError> {
    let path = dir.join(METADATA_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(DatasetError::Metadata {
                path,
                reason: err.to_string(),
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| DatasetError::Metadata {
            path,
            reason: err.to_string(),
        })
}
