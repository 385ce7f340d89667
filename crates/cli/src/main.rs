use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use core_types::config::{AppConfig, load_or_create_config};
use dataset::DatasetSource;
use glyph_cli::{build::build_dataset, render};
use mimalloc::MiMalloc;
use protocol::SearchRequest;
use semantic_index::Metric;
use service::{
    GlyphSearchHandler, SearchHandler, SearchState, ServiceMetrics, init_metrics_from_config,
    init_tracing_with_config, spawn_search,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Local harness for the glyph search pipeline.
#[derive(Parser, Debug)]
#[command(name = "glyph-search", version, about = "Glyph nearest-neighbour search harness")]
struct Cli {
    /// Config file (created with defaults when missing).
    #[arg(short, long, global = true, env = "GLYPH_SEARCH_CONFIG")]
    config: Option<PathBuf>,
    /// Dataset directory; overrides config and environment.
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one search.
    Search {
        /// Whitespace-separated feature values.
        query: String,
        /// Dataset version the features were extracted for.
        #[arg(short = 'v', long = "dataset-version")]
        version: Option<String>,
        /// Number of neighbours to return (1 to 20).
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=20))]
        k: Option<u64>,
    },
    /// Read queries from stdin, one per line, against a single loaded dataset.
    Repl {
        #[arg(short = 'v', long = "dataset-version")]
        version: Option<String>,
    },
    /// Load the dataset and print what was loaded.
    Warmup,
    /// Load the dataset, then print Prometheus metrics.
    Metrics,
    /// Build a dataset directory from feature rows and labels.
    Build {
        /// One whitespace-separated vector per line.
        #[arg(long)]
        vectors: PathBuf,
        /// One label per line; line i names vector i.
        #[arg(long)]
        labels: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = MetricArg::L2)]
        metric: MetricArg,
        #[arg(long = "dataset-version")]
        version: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricArg {
    L2,
    L1,
    Cosine,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::L2 => Self::L2,
            MetricArg::L1 => Self::L1,
            MetricArg::Cosine => Self::Cosine,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut cfg = load_or_create_config(cli.config.as_deref())?;
    let _guard = init_tracing_with_config(&cfg.logging)?;
    if let Some(dir) = &cli.dataset {
        cfg.dataset.local_path = Some(dir.clone());
    }

    match cli.command {
        Commands::Search { query, version, k } => {
            if let Some(k) = k {
                cfg.search.k = usize::try_from(k)?;
            }
            let (handler, _) = build_handler(&cfg)?;
            let req = with_version(SearchRequest::new(query), version);
            let resp = spawn_search(handler, req).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                print!("{}", render::hits_table(&resp));
            }
        }
        Commands::Repl { version } => {
            let (handler, _) = build_handler(&cfg)?;
            run_repl(handler, version, cli.json).await?;
        }
        Commands::Warmup => {
            let (handler, _) = build_handler(&cfg)?;
            let warm = tokio::task::spawn_blocking(move || handler.warmup()).await??;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&warm)?);
            } else {
                println!("{}", style(render::warmup_summary(&warm)).green());
            }
        }
        Commands::Metrics => {
            cfg.metrics.enabled = true;
            let (handler, metrics) = build_handler(&cfg)?;
            let warm = tokio::task::spawn_blocking(move || handler.warmup()).await?;
            if let Err(err) = warm {
                eprintln!("{} {err}", style("warmup failed:").red());
            }
            if let Some(metrics) = metrics {
                print!("{}", metrics.scrape()?);
            }
        }
        Commands::Build {
            vectors,
            labels,
            out,
            metric,
            version,
        } => {
            let meta = build_dataset(&vectors, &labels, &out, metric.into(), version)?;
            println!(
                "{} {} items of dimension {} written to {}",
                style("built").green(),
                meta.num_items.unwrap_or(0),
                meta.dimen.unwrap_or(0),
                out.display()
            );
        }
    }
    Ok(())
}

fn build_handler(
    cfg: &AppConfig,
) -> Result<(Arc<dyn SearchHandler>, Option<Arc<ServiceMetrics>>)> {
    let metrics = init_metrics_from_config(&cfg.metrics)?;
    let mut state = SearchState::new(DatasetSource::new(cfg.dataset.clone()));
    if let Some(metrics) = &metrics {
        state = state.with_metrics(Arc::clone(metrics));
    }
    let mut handler = GlyphSearchHandler::new(Arc::new(state), cfg.search.clone());
    if let Some(metrics) = &metrics {
        handler = handler.with_metrics(Arc::clone(metrics));
    }
    Ok((Arc::new(handler), metrics))
}

fn with_version(req: SearchRequest, version: Option<String>) -> SearchRequest {
    match version {
        Some(v) => req.with_version(v),
        None => req,
    }
}

async fn run_repl(
    handler: Arc<dyn SearchHandler>,
    version: Option<String>,
    json: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let req = with_version(SearchRequest::new(line), version.clone());
        match spawn_search(Arc::clone(&handler), req).await {
            Ok(resp) if json => println!("{}", serde_json::to_string(&resp)?),
            Ok(resp) => print!("{}", render::hits_table(&resp)),
            Err(err) => eprintln!(
                "{} {err}",
                style(format!("error {}:", err.status_code())).red()
            ),
        }
    }
    Ok(())
}
