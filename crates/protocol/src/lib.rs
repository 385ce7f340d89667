//! Request/response models for glyph search.
//!
//! Transports (HTTP handlers, the CLI harness) serialize these with serde;
//! the models themselves stay free of index or dataset dependencies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A search as received from a client: the raw whitespace-separated feature
/// values plus the dataset version the client's feature extractor targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            v: None,
        }
    }

    pub fn with_version(mut self, v: impl Into<String>) -> Self {
        self.v = Some(v.into());
        self
    }
}

/// One ranked glyph; lower distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub label: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub id: Uuid,
    /// Ascending by distance, as ranked by the index.
    pub hits: Vec<SearchHit>,
    pub took_ms: u32,
}

/// Dataset facts reported once the index is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupResponse {
    pub dump_time: Option<i64>,
    pub num_items: usize,
    pub v: Option<String>,
    pub dimension: usize,
    pub labels: usize,
}
