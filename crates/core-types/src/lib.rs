//! Core identifiers and shared lightweight types for glyph search.
//!
//! These types intentionally avoid heavy dependencies so that the index,
//! dataset, and wire crates can all share them.

use serde::{Deserialize, Serialize};

pub type Distance = f32;

/// Number of neighbours returned for a query unless configured otherwise.
pub const DEFAULT_RESULT_COUNT: usize = 20;

/// Default approximation tolerance handed to the index on every search.
pub const DEFAULT_EPSILON: f32 = 0.1;

/// Identifier of an indexed glyph as reported by the index.
///
/// Identifiers are 1-based: id `n` refers to line `n - 1` of the label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlyphId(pub u32);

impl GlyphId {
    /// Build the id of the glyph stored at 0-based table position `index`.
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .map(GlyphId)
    }

    /// 0-based table position, or `None` for the reserved id 0.
    pub const fn to_index(self) -> Option<usize> {
        match self.0 {
            0 => None,
            n => Some((n - 1) as usize),
        }
    }
}

impl std::fmt::Display for GlyphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub mod config;
