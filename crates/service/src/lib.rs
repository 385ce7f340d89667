//! Glyph search service core: lazily loaded search state, query handling,
//! and the tracing/metrics bootstrap shared by the binaries.

pub mod error;
pub mod executor;
mod logging;
pub mod metrics;
pub mod query;
pub mod search_handler;
pub mod state;

pub use error::{InitError, SearchError};
pub use logging::{init_tracing, init_tracing_with_config};
pub use metrics::{ServiceMetrics, init_metrics_from_config};
pub use query::{QueryError, normalize, parse_query};
pub use search_handler::{GlyphSearchHandler, SearchHandler, spawn_search};
pub use state::{DatasetProvider, LoadedDataset, SearchState, open_dataset};
