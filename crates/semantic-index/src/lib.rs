//! Vector search capability used by the glyph search service.
//!
//! The service only relies on the [`AnnIndex`] contract: a fixed dimension and
//! a ranked `search`. [`FlatIndex`] is the on-disk implementation shipped in
//! dataset archives under [`INDEX_ROOT`]. With the `hnsw_rs` feature,
//! `HnswIndex` links those rows into an approximate graph whose search
//! breadth follows `epsilon`.

pub mod ann;

pub use ann::flat::{FlatIndex, INDEX_FILE, INDEX_ROOT};
#[cfg(feature = "hnsw_rs")]
pub use ann::hnsw::{HnswIndex, ef_for};
pub use ann::{AnnIndex, IndexError, Metric, Neighbor};
