//! Dataset origin selection and the scoped handle over its directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use core_types::config::{DatasetConfig, RemoteArchive};
use tempfile::TempDir;

use crate::archive::extract_tar_gz;
use crate::error::{DatasetError, FetchError};
use crate::remote::{ArchiveFetcher, DeadlineReader, GcsFetcher};

const TEMP_PREFIX: &str = "glyph-dataset";

/// Directory holding a dataset, local or process-owned.
///
/// A `Temporary` handle deletes its directory when released or dropped, so
/// the directory is gone on every exit path once loading is finished.
#[derive(Debug)]
pub enum DatasetHandle {
    Local(PathBuf),
    Temporary(TempDir),
}

impl DatasetHandle {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Temporary(dir) => dir.path(),
        }
    }

    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Give up the dataset directory. Local directories are left untouched;
    /// temporary ones are removed recursively.
    pub fn release(self) {
        match self {
            Self::Local(_) => {}
            Self::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                match dir.close() {
                    Ok(()) => tracing::debug!(path = %path.display(), "temporary dataset removed"),
                    Err(err) => tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to remove temporary dataset"
                    ),
                }
            }
        }
    }
}

/// Resolves the configured dataset origin into a [`DatasetHandle`].
///
/// Preference order: a local directory, then a remote archive (bucket and
/// object both set) unpacked into a fresh temporary directory.
#[derive(Clone)]
pub struct DatasetSource {
    config: DatasetConfig,
    fetcher: Option<Arc<dyn ArchiveFetcher>>,
}

impl std::fmt::Debug for DatasetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSource")
            .field("config", &self.config)
            .field("custom_fetcher", &self.fetcher.is_some())
            .finish()
    }
}

impl DatasetSource {
    pub const fn new(config: DatasetConfig) -> Self {
        Self {
            config,
            fetcher: None,
        }
    }

    /// Use `fetcher` for remote archives instead of the Cloud Storage client.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub const fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn resolve(&self) -> Result<DatasetHandle, DatasetError> {
        if let Some(dir) = self.config.local_dir() {
            tracing::info!(path = %dir.display(), "using local dataset directory");
            return Ok(DatasetHandle::Local(dir.to_path_buf()));
        }

        if let Some(remote) = self.config.remote_archive() {
            return self.fetch_remote(&remote);
        }

        Err(DatasetError::NoDatasetConfigured)
    }

    fn fetch_remote(&self, remote: &RemoteArchive) -> Result<DatasetHandle, DatasetError> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(DatasetError::TempDir)?;
        let fetch_err = |source: FetchError| DatasetError::Fetch {
            location: remote.to_string(),
            source,
        };

        let fetcher: Arc<dyn ArchiveFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(GcsFetcher::from_config(&self.config).map_err(fetch_err)?),
        };

        let started = Instant::now();
        tracing::info!(location = %remote, dest = %dir.path().display(), "dataset download start");
        let body = fetcher.fetch(remote).map_err(fetch_err)?;
        let stats = extract_tar_gz(
            DeadlineReader::new(body, self.config.fetch_timeout()),
            dir.path(),
        )
        .map_err(|e| fetch_err(e.into()))?;
        tracing::info!(
            location = %remote,
            files = stats.files,
            bytes = stats.bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dataset extract complete"
        );

        Ok(DatasetHandle::Temporary(dir))
    }
}
