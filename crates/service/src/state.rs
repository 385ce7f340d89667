//! Lazily initialized search state shared by all requests.
//!
//! The dataset is loaded by the first caller that needs it. Callers arriving
//! while that load runs block until it settles and all receive its outcome.
//! A failed load leaves the state uninitialized, so the next caller retries.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use dataset::{
    DatasetHandle, DatasetMeta, DatasetSource, LABEL_FILE, LabelTable, load_label_table,
    load_metadata,
};
use parking_lot::{Condvar, Mutex};
use semantic_index::{AnnIndex, FlatIndex, INDEX_ROOT};

use crate::error::InitError;
use crate::metrics::ServiceMetrics;

/// Index, labels, and metadata loaded from one dataset directory.
pub struct LoadedDataset {
    pub index: Arc<dyn AnnIndex>,
    pub labels: LabelTable,
    pub meta: Option<DatasetMeta>,
}

impl std::fmt::Debug for LoadedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDataset")
            .field("dimension", &self.index.dimension())
            .field("items", &self.index.len())
            .field("labels", &self.labels.len())
            .field("meta", &self.meta)
            .finish()
    }
}

/// Supplies the dataset directory and reads a dataset out of it.
pub trait DatasetProvider: Send + Sync {
    fn resolve(&self) -> Result<DatasetHandle, InitError>;

    fn open(&self, dir: &Path) -> Result<LoadedDataset, InitError> {
        open_dataset(dir)
    }
}

impl DatasetProvider for DatasetSource {
    fn resolve(&self) -> Result<DatasetHandle, InitError> {
        Ok(Self::resolve(self)?)
    }
}

/// Open `anng`, `names.txt`, and the optional `metadata.json` in `dir`.
pub fn open_dataset(dir: &Path) -> Result<LoadedDataset, InitError> {
    let index = FlatIndex::open(&dir.join(INDEX_ROOT))?;
    tracing::info!(dimension = index.dimension(), items = index.len(), "index loaded");

    let labels = load_label_table(&dir.join(LABEL_FILE))?;
    tracing::info!(labels = labels.len(), "glyph list loaded");

    let meta = load_metadata(dir)?;
    let dataset = LoadedDataset {
        index: search_index(index)?,
        labels,
        meta,
    };
    check_consistency(&dataset)?;
    Ok(dataset)
}

#[cfg(feature = "hnsw")]
fn search_index(flat: FlatIndex) -> Result<Arc<dyn AnnIndex>, InitError> {
    let started = Instant::now();
    let graph = semantic_index::HnswIndex::from_flat(&flat)?;
    tracing::info!(
        items = graph.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "hnsw graph linked"
    );
    Ok(Arc::new(graph))
}

#[cfg(not(feature = "hnsw"))]
#[allow(clippy::unnecessary_wraps)]
fn search_index(flat: FlatIndex) -> Result<Arc<dyn AnnIndex>, InitError> {
    Ok(Arc::new(flat))
}

/// Compare the loaded parts against each other and against the metadata.
fn check_consistency(dataset: &LoadedDataset) -> Result<(), InitError> {
    let dimension = dataset.index.dimension();
    let labels = dataset.labels.len();

    if let Some(meta) = &dataset.meta {
        if let Some(dimen) = meta.dimen
            && dimen != dimension
        {
            return Err(InitError::Inconsistent(format!(
                "metadata declares dimension {dimen}, index has {dimension}"
            )));
        }
        if let Some(items) = meta.num_items
            && labels < items
        {
            return Err(InitError::Inconsistent(format!(
                "metadata declares {items} items, label table has {labels}"
            )));
        }
    }

    if labels < dataset.index.len() {
        tracing::warn!(
            labels,
            items = dataset.index.len(),
            "label table is shorter than the index; some hits cannot be labelled"
        );
    }
    Ok(())
}

/// One load attempt. Its failure stays readable by the callers that waited
/// on it, whatever later attempts do.
#[derive(Debug)]
struct Attempt {
    id: u64,
    failure: OnceLock<Arc<InitError>>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Loading(Arc<Attempt>),
    Ready,
}

#[derive(Debug)]
struct Inner {
    attempts: u64,
    phase: Phase,
}

/// Process-wide search state, passed by reference to request handlers.
pub struct SearchState {
    provider: Box<dyn DatasetProvider>,
    ready: OnceLock<Arc<LoadedDataset>>,
    inner: Mutex<Inner>,
    settled: Condvar,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl std::fmt::Debug for SearchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchState")
            .field("ready", &self.ready.get().is_some())
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl SearchState {
    pub fn new(provider: impl DatasetProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            ready: OnceLock::new(),
            inner: Mutex::new(Inner {
                attempts: 0,
                phase: Phase::Idle,
            }),
            settled: Condvar::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// Loaded dataset, loading it first if nobody has yet.
    pub fn ensure_ready(&self) -> Result<Arc<LoadedDataset>, Arc<InitError>> {
        if let Some(dataset) = self.ready.get() {
            return Ok(Arc::clone(dataset));
        }

        let mut inner = self.inner.lock();
        let mut waited_on: Option<Arc<Attempt>> = None;
        loop {
            if let Some(dataset) = self.ready.get() {
                return Ok(Arc::clone(dataset));
            }
            if let Some(error) = waited_on.as_ref().and_then(|a| a.failure.get()) {
                return Err(Arc::clone(error));
            }
            match &inner.phase {
                Phase::Loading(attempt) => {
                    if waited_on.is_none() {
                        waited_on = Some(Arc::clone(attempt));
                    }
                    self.settled.wait(&mut inner);
                }
                // Nothing loaded yet, or an earlier attempt failed before we
                // arrived: start a new attempt.
                Phase::Idle | Phase::Ready => break,
            }
        }

        inner.attempts += 1;
        let attempt = Arc::new(Attempt {
            id: inner.attempts,
            failure: OnceLock::new(),
        });
        inner.phase = Phase::Loading(Arc::clone(&attempt));
        drop(inner);

        let id = attempt.id;
        let mut guard = AttemptGuard {
            state: self,
            attempt,
            settled: false,
        };
        let outcome = self.load(id);
        guard.settle(outcome.as_ref().err().map(Arc::clone));
        outcome
    }

    fn load(&self, attempt: u64) -> Result<Arc<LoadedDataset>, Arc<InitError>> {
        let started = Instant::now();
        tracing::info!(attempt, "loading dataset");

        let result = self.provider.resolve().and_then(|handle| {
            let opened = self.provider.open(handle.path());
            let temporary = handle.is_temporary();
            let dataset = opened.map(|dataset| {
                let dataset = Arc::new(dataset);
                let _ = self.ready.set(Arc::clone(&dataset));
                dataset
            });
            handle.release();
            if temporary {
                tracing::debug!(attempt, "temporary dataset released");
            }
            dataset
        });

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_load(result.is_ok(), elapsed);
        }
        match result {
            Ok(dataset) => {
                tracing::info!(
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    dimension = dataset.index.dimension(),
                    labels = dataset.labels.len(),
                    "dataset ready"
                );
                Ok(dataset)
            }
            Err(err) => {
                tracing::error!(attempt, error = %err, "dataset load failed");
                Err(Arc::new(err))
            }
        }
    }
}

/// Publishes the outcome of a load attempt and wakes waiters, including when
/// the loader unwinds.
struct AttemptGuard<'a> {
    state: &'a SearchState,
    attempt: Arc<Attempt>,
    settled: bool,
}

impl AttemptGuard<'_> {
    fn settle(&mut self, error: Option<Arc<InitError>>) {
        let mut inner = self.state.inner.lock();
        inner.phase = match error {
            None => Phase::Ready,
            Some(error) => {
                let _ = self.attempt.failure.set(error);
                Phase::Idle
            }
        };
        self.settled = true;
        drop(inner);
        self.state.settled.notify_all();
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(Some(Arc::new(InitError::Panicked)));
        }
    }
}
