use std::sync::Arc;
use std::time::Instant;

use core_types::DEFAULT_RESULT_COUNT;
use core_types::config::SearchConfig;
use protocol::{SearchRequest, SearchResponse, WarmupResponse};

use crate::error::SearchError;
use crate::executor::execute;
use crate::metrics::ServiceMetrics;
use crate::query::{normalize, parse_query};
use crate::state::{LoadedDataset, SearchState};

/// Executes search requests arriving from a transport.
pub trait SearchHandler: Send + Sync {
    fn search(&self, req: SearchRequest) -> Result<SearchResponse, SearchError>;

    /// Load the dataset if needed and describe it.
    fn warmup(&self) -> Result<WarmupResponse, SearchError>;
}

/// Handler backed by the shared [`SearchState`].
#[derive(Debug, Clone)]
pub struct GlyphSearchHandler {
    state: Arc<SearchState>,
    config: SearchConfig,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl GlyphSearchHandler {
    /// `config.k` is clamped to `1..=DEFAULT_RESULT_COUNT`; responses never
    /// carry more than that many hits.
    pub fn new(state: Arc<SearchState>, mut config: SearchConfig) -> Self {
        let k = config.k.clamp(1, DEFAULT_RESULT_COUNT);
        if k != config.k {
            tracing::warn!(
                configured = config.k,
                used = k,
                "search.k out of range, clamped"
            );
            config.k = k;
        }
        Self {
            state,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn run(&self, req: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        // Malformed input is rejected before any dataset work.
        let values = parse_query(&req.query)?;
        let dataset = self.state.ensure_ready()?;
        check_version(req.v.as_deref(), &dataset)?;

        let vector = normalize(values, dataset.index.dimension())?;
        let hits = execute(
            dataset.index.as_ref(),
            &dataset.labels,
            &vector,
            self.config.k,
            self.config.epsilon,
        )?;

        Ok(SearchResponse {
            id: req.id,
            hits,
            took_ms: u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX),
        })
    }
}

fn check_version(requested: Option<&str>, dataset: &LoadedDataset) -> Result<(), SearchError> {
    let expected = dataset.meta.as_ref().and_then(|m| m.v.as_deref());
    match (requested, expected) {
        (Some(requested), Some(expected)) if requested != expected => {
            Err(SearchError::VersionMismatch {
                requested: requested.to_string(),
                expected: expected.to_string(),
            })
        }
        _ => Ok(()),
    }
}

impl SearchHandler for GlyphSearchHandler {
    fn search(&self, req: SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let result = self.run(&req);
        let outcome = match &result {
            Ok(resp) => {
                tracing::debug!(id = %req.id, hits = resp.hits.len(), took_ms = resp.took_ms, "search served");
                "ok"
            }
            Err(err) if err.is_client_error() => {
                tracing::info!(id = %req.id, error = %err, "search rejected");
                err.outcome()
            }
            Err(err) => {
                tracing::error!(id = %req.id, error = %err, "search failed");
                err.outcome()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_search(outcome, started.elapsed());
        }
        result
    }

    fn warmup(&self) -> Result<WarmupResponse, SearchError> {
        let dataset = self.state.ensure_ready()?;
        let meta = dataset.meta.clone().unwrap_or_default();
        Ok(WarmupResponse {
            dump_time: meta.dump_time,
            num_items: meta.num_items.unwrap_or_else(|| dataset.index.len()),
            v: meta.v,
            dimension: dataset.index.dimension(),
            labels: dataset.labels.len(),
        })
    }
}

/// Run a search on the blocking pool; the first request may wait on a
/// dataset download.
pub async fn spawn_search(
    handler: Arc<dyn SearchHandler>,
    req: SearchRequest,
) -> Result<SearchResponse, SearchError> {
    tokio::task::spawn_blocking(move || handler.search(req))
        .await
        .map_err(|err| SearchError::Task(err.to_string()))?
}
