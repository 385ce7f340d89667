use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while unpacking a dataset archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("refusing archive entry with unsafe path {name:?}")]
    UnsafePath { name: String },
    #[error("unsupported archive entry type {kind} for {name:?}")]
    UnsupportedEntry { kind: String, name: String },
    #[error("archive io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while downloading and unpacking a remote dataset.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid storage endpoint {endpoint}: {reason}")]
    Endpoint { endpoint: String, reason: String },
    #[error("storage client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("storage returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Errors raised while locating or reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(
        "no dataset available: set a local dataset path or both a remote bucket and object"
    )]
    NoDatasetConfigured,
    #[error("failed to create temporary dataset directory: {0}")]
    TempDir(#[source] io::Error),
    #[error("failed to fetch dataset from {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to read label file {path}: {source}")]
    LabelLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid dataset metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },
}
