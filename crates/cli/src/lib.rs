//! Helpers behind the `glyph-search` binary.

pub mod build;
pub mod render;
