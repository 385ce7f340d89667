//! Assemble a dataset directory (`anng`, `names.txt`, `metadata.json`) from
//! plain-text feature rows.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use dataset::{DatasetMeta, LABEL_FILE, METADATA_FILE, load_label_table};
use semantic_index::{FlatIndex, INDEX_FILE, INDEX_ROOT, Metric};
use service::parse_query;

/// Read one whitespace-separated feature vector per line; blank lines are
/// skipped.
pub fn read_rows(reader: impl BufRead) -> Result<Vec<Vec<f32>>> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_query(&line).with_context(|| format!("line {}", line_no + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::L2 => "l2",
        Metric::L1 => "l1",
        Metric::Cosine => "cosine",
    }
}

/// Build a dataset in `out` from a vectors file and a label file whose line
/// `i` names row `i`.
pub fn build_dataset(
    vectors: &Path,
    labels: &Path,
    out: &Path,
    metric: Metric,
    version: Option<String>,
) -> Result<DatasetMeta> {
    let file = fs::File::open(vectors)
        .with_context(|| format!("failed to open vectors file {}", vectors.display()))?;
    let rows = read_rows(BufReader::new(file))
        .with_context(|| format!("invalid vectors file {}", vectors.display()))?;
    if rows.is_empty() {
        bail!("vectors file {} has no rows", vectors.display());
    }
    let table = load_label_table(labels)?;
    if table.len() < rows.len() {
        bail!(
            "label file has {} entries but there are {} vectors",
            table.len(),
            rows.len()
        );
    }

    let index = FlatIndex::build(metric, &rows)?;
    let index_dir = out.join(INDEX_ROOT);
    fs::create_dir_all(&index_dir)
        .with_context(|| format!("failed to create {}", index_dir.display()))?;
    index.save(&index_dir.join(INDEX_FILE))?;

    let names: Vec<&str> = table.iter().collect();
    fs::write(out.join(LABEL_FILE), names.join("\n"))
        .with_context(|| format!("failed to write labels to {}", out.display()))?;

    let dump_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let meta = DatasetMeta {
        v: version,
        dimen: Some(rows[0].len()),
        num_items: Some(rows.len()),
        dump_time: Some(dump_time),
        metric: Some(metric_name(metric).to_string()),
    };
    fs::write(out.join(METADATA_FILE), serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("failed to write metadata to {}", out.display()))?;

    tracing::info!(
        out = %out.display(),
        items = rows.len(),
        dimension = rows[0].len(),
        "dataset built"
    );
    Ok(meta)
}
