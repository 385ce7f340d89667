use std::fmt::Write as _;

use console::style;
use protocol::{SearchResponse, WarmupResponse};

/// Human-readable hit table, best match first.
pub fn hits_table(resp: &SearchResponse) -> String {
    let mut out = String::new();
    if resp.hits.is_empty() {
        let _ = writeln!(out, "{}", style("no matches").yellow());
        return out;
    }
    let width = resp
        .hits
        .iter()
        .map(|h| h.label.chars().count())
        .max()
        .unwrap_or(0);
    for (rank, hit) in resp.hits.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<width$}  {}",
            rank + 1,
            style(&hit.label).bold(),
            style(format!("{:.4}", hit.distance)).dim(),
        );
    }
    let _ = writeln!(
        out,
        "{}",
        style(format!("{} hits in {} ms", resp.hits.len(), resp.took_ms)).dim()
    );
    out
}

pub fn warmup_summary(warm: &WarmupResponse) -> String {
    let version = warm.v.as_deref().unwrap_or("unversioned");
    let dumped = warm
        .dump_time
        .map_or_else(|| "unknown".to_string(), |t| t.to_string());
    format!(
        "dataset {version}: {} items, {} labels, dimension {}, dumped at {dumped}",
        warm.num_items, warm.labels, warm.dimension
    )
}
