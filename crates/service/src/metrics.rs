//! Prometheus metrics for searches and dataset loads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use core_types::config::MetricsConfig;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: Histogram,
    loads: IntCounterVec,
    load_seconds: Histogram,
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("glyph_search_requests_total", "Search requests by outcome"),
            &["outcome"],
        )?;
        let latency = Histogram::with_opts(
            HistogramOpts::new(
                "glyph_search_latency_seconds",
                "End-to-end search latency, including any dataset load it waited on",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        let loads = IntCounterVec::new(
            Opts::new("glyph_search_dataset_loads_total", "Dataset load attempts by outcome"),
            &["outcome"],
        )?;
        let load_seconds = Histogram::with_opts(
            HistogramOpts::new("glyph_search_dataset_load_seconds", "Dataset load duration")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(loads.clone()))?;
        registry.register(Box::new(load_seconds.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
            loads,
            load_seconds,
        })
    }

    pub fn record_search(&self, outcome: &str, elapsed: Duration) {
        self.requests.with_label_values(&[outcome]).inc();
        self.latency.observe(elapsed.as_secs_f64());
    }

    pub fn record_load(&self, ok: bool, elapsed: Duration) {
        let outcome = if ok { "ok" } else { "error" };
        self.loads.with_label_values(&[outcome]).inc();
        self.load_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn searches(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    pub fn loads(&self, ok: bool) -> u64 {
        self.loads
            .with_label_values(&[if ok { "ok" } else { "error" }])
            .get()
    }

    /// Render all metrics in the Prometheus text format.
    pub fn scrape(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

/// Build metrics when enabled in config.
pub fn init_metrics_from_config(cfg: &MetricsConfig) -> Result<Option<Arc<ServiceMetrics>>> {
    if !cfg.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(ServiceMetrics::new()?)))
}
