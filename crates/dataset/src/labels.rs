use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use core_types::GlyphId;

use crate::error::DatasetError;

/// Label file name inside a dataset directory.
pub const LABEL_FILE: &str = "names.txt";

/// Ordered glyph names; line `i` of the label file names glyph id `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub const fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a 1-based glyph id, `None` when the id is outside the table.
    pub fn label_for(&self, id: GlyphId) -> Option<&str> {
        id.to_index()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Read a label table, one label per line. Only the line ending (`\n` or
/// `\r\n`) is stripped; all other whitespace is part of the label.
pub fn load_label_table(path: &Path) -> Result<LabelTable, DatasetError> {
    let read = || -> io::Result<LabelTable> {
        let file = File::open(path)?;
        read_labels(BufReader::new(file))
    };
    let table = read().map_err(|source| DatasetError::LabelLoad {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), labels = table.len(), "label table loaded");
    Ok(table)
}

fn read_labels(reader: impl BufRead) -> io::Result<LabelTable> {
    let names = reader.lines().collect::<io::Result<Vec<_>>>()?;
    Ok(LabelTable::new(names))
}
