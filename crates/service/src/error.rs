use std::sync::Arc;

use dataset::DatasetError;
use semantic_index::IndexError;
use thiserror::Error;

use crate::query::QueryError;

/// Why loading the dataset into the search state failed.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("dataset is inconsistent: {0}")]
    Inconsistent(String),
    #[error("dataset initialization panicked")]
    Panicked,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Shared by every caller that waited on the same failed attempt.
    #[error("dataset unavailable: {0}")]
    Init(#[from] Arc<InitError>),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("index returned glyph id {id} but the label table has {labels} entries")]
    LabelIndexOutOfRange { id: u32, labels: usize },
    #[error("invalid parameter 'v': requested {requested}, dataset is {expected}")]
    VersionMismatch { requested: String, expected: String },
    #[error("search task failed: {0}")]
    Task(String),
}

impl SearchError {
    /// HTTP-style status for transports that surface these errors.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Query(_) => 400,
            Self::VersionMismatch { .. } => 404,
            Self::Init(_) | Self::Index(_) | Self::LabelIndexOutOfRange { .. } | Self::Task(_) => {
                500
            }
        }
    }

    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Query(_) | Self::VersionMismatch { .. })
    }

    /// Short label used for metrics.
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Query(_) => "invalid_query",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::Init(_) => "dataset_unavailable",
            Self::Index(_) | Self::Task(_) => "search_failed",
            Self::LabelIndexOutOfRange { .. } => "corrupt_dataset",
        }
    }
}
