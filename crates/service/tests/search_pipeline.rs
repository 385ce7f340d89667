//! End-to-end searches against real dataset directories and archives.

use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use core_types::DEFAULT_RESULT_COUNT;
use core_types::config::{DatasetConfig, RemoteArchive, SearchConfig, load_or_create_config};
use dataset::{
    ArchiveFetcher, DatasetError, DatasetHandle, DatasetSource, FetchError, LABEL_FILE,
    METADATA_FILE,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use protocol::SearchRequest;
use semantic_index::{FlatIndex, INDEX_FILE, INDEX_ROOT, Metric};
use service::{
    DatasetProvider, GlyphSearchHandler, InitError, QueryError, SearchError, SearchHandler,
    SearchState,
};
use tempfile::TempDir;

const LABELS: [&str; 4] = ["α", "β", "γ", "δ"];

fn rows() -> Vec<Vec<f32>> {
    vec![
        vec![0.0, 0.0, 0.0],
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ]
}

fn index_bytes() -> Result<Vec<u8>> {
    let scratch = TempDir::new()?;
    let path = scratch.path().join(INDEX_FILE);
    FlatIndex::build(Metric::L2, &rows())?.save(&path)?;
    Ok(fs::read(path)?)
}

fn metadata_json() -> String {
    serde_json::json!({
        "v": "7",
        "dimen": 3,
        "numItems": LABELS.len(),
        "dumpTime": 1_700_000_000,
        "metric": "l2",
    })
    .to_string()
}

/// Dataset directory laid out as the index build writes it.
fn local_dataset() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::create_dir(dir.path().join(INDEX_ROOT))?;
    fs::write(dir.path().join(INDEX_ROOT).join(INDEX_FILE), index_bytes()?)?;
    fs::write(dir.path().join(LABEL_FILE), LABELS.join("\n"))?;
    fs::write(dir.path().join(METADATA_FILE), metadata_json())?;
    Ok(dir)
}

fn dataset_archive(with_labels: bool) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut append = |name: &str, data: &[u8]| -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data)?;
        Ok(())
    };
    append(&format!("{INDEX_ROOT}/{INDEX_FILE}"), &index_bytes()?)?;
    if with_labels {
        append(LABEL_FILE, LABELS.join("\n").as_bytes())?;
    }
    append(METADATA_FILE, metadata_json().as_bytes())?;
    Ok(builder.into_inner()?.finish()?)
}

fn handler_for(provider: impl DatasetProvider + 'static) -> GlyphSearchHandler {
    GlyphSearchHandler::new(Arc::new(SearchState::new(provider)), SearchConfig::default())
}

fn remote_config() -> DatasetConfig {
    DatasetConfig {
        bucket: Some("glyphs".into()),
        object: Some("index.tar.gz".into()),
        ..DatasetConfig::default()
    }
}

/// Serves a fixed archive, optionally slowly, counting requests.
struct ArchiveFixture {
    bytes: Vec<u8>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ArchiveFetcher for ArchiveFixture {
    fn fetch(&self, _remote: &RemoteArchive) -> Result<Box<dyn Read + Send>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }
}

/// Wraps a source and remembers every directory it handed out.
struct Recording {
    source: DatasetSource,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl DatasetProvider for Recording {
    fn resolve(&self) -> Result<DatasetHandle, InitError> {
        let handle = self.source.resolve()?;
        self.seen.lock().unwrap().push(handle.path().to_path_buf());
        Ok(handle)
    }
}

fn distances_ascending(hits: &[protocol::SearchHit]) -> bool {
    hits.windows(2).all(|w| w[0].distance <= w[1].distance)
}

#[test]
fn searches_a_local_dataset() -> Result<()> {
    let dir = local_dataset()?;
    let source = DatasetSource::new(DatasetConfig {
        local_path: Some(dir.path().to_path_buf()),
        ..remote_config()
    });
    let handler = handler_for(source);

    let resp = handler.search(SearchRequest::new("0.9 0.1").with_version("7"))?;
    assert_eq!(resp.hits.len(), LABELS.len());
    assert_eq!(resp.hits[0].label, "β");
    assert!(distances_ascending(&resp.hits));

    let warm = handler.warmup()?;
    assert_eq!(warm.dimension, 3);
    assert_eq!(warm.num_items, 4);
    assert_eq!(warm.v.as_deref(), Some("7"));

    // local directories are never cleaned up
    assert!(dir.path().join(LABEL_FILE).exists());
    Ok(())
}

#[test]
fn remote_archive_is_unpacked_then_removed() -> Result<()> {
    let fetcher = Arc::new(ArchiveFixture {
        bytes: dataset_archive(true)?,
        delay: Duration::ZERO,
        calls: AtomicUsize::new(0),
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = handler_for(Recording {
        source: DatasetSource::new(remote_config()).with_fetcher(fetcher.clone()),
        seen: Arc::clone(&seen),
    });

    let resp = handler.search(SearchRequest::new("0 0 1"))?;
    assert_eq!(resp.hits[0].label, "δ");
    assert!(resp.hits[0].distance.abs() < 1e-6);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].exists(), "temporary dataset left at {}", seen[0].display());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn broken_archive_fails_cleans_up_and_retries() -> Result<()> {
    let fetcher = Arc::new(ArchiveFixture {
        bytes: dataset_archive(false)?,
        delay: Duration::ZERO,
        calls: AtomicUsize::new(0),
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = handler_for(Recording {
        source: DatasetSource::new(remote_config()).with_fetcher(fetcher.clone()),
        seen: Arc::clone(&seen),
    });

    for _ in 0..2 {
        let err = handler.search(SearchRequest::new("1 0 0")).unwrap_err();
        let SearchError::Init(init) = &err else {
            panic!("expected an init error, got {err:?}");
        };
        assert!(matches!(
            init.as_ref(),
            InitError::Dataset(DatasetError::LabelLoad { .. })
        ));
        assert_eq!(err.status_code(), 500);
    }

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    for path in seen.lock().unwrap().iter() {
        assert!(!path.exists());
    }
    Ok(())
}

#[test]
fn concurrent_first_searches_download_once() -> Result<()> {
    let fetcher = Arc::new(ArchiveFixture {
        bytes: dataset_archive(true)?,
        delay: Duration::from_millis(200),
        calls: AtomicUsize::new(0),
    });
    let handler = Arc::new(handler_for(
        DatasetSource::new(remote_config()).with_fetcher(fetcher.clone()),
    ));
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let handler = Arc::clone(&handler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let query = if i % 2 == 0 { "1 0 0" } else { "0 1 0" };
                handler.search(SearchRequest::new(query))
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        let resp = worker.join().expect("search thread panicked")?;
        let expected = if i % 2 == 0 { "β" } else { "γ" };
        assert_eq!(resp.hits[0].label, expected);
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn unconfigured_dataset_is_reported_per_request() {
    let handler = handler_for(DatasetSource::new(DatasetConfig::default()));
    for _ in 0..2 {
        let err = handler.search(SearchRequest::new("1")).unwrap_err();
        assert!(matches!(
            &err,
            SearchError::Init(init) if matches!(
                init.as_ref(),
                InitError::Dataset(DatasetError::NoDatasetConfigured)
            )
        ));
    }
}

#[test]
fn dimension_overflow_is_rejected() -> Result<()> {
    let dir = local_dataset()?;
    let handler = handler_for(DatasetSource::new(DatasetConfig {
        local_path: Some(dir.path().to_path_buf()),
        ..DatasetConfig::default()
    }));
    let err = handler.search(SearchRequest::new("1 2 3 4")).unwrap_err();
    assert!(matches!(
        err,
        SearchError::Query(QueryError::DimensionExceeded {
            len: 4,
            dimension: 3
        })
    ));
    Ok(())
}

#[test]
fn inconsistent_metadata_fails_initialization() -> Result<()> {
    let dir = local_dataset()?;
    fs::write(
        dir.path().join(METADATA_FILE),
        r#"{"v":"7","dimen":128,"numItems":4}"#,
    )?;
    let handler = handler_for(DatasetSource::new(DatasetConfig {
        local_path: Some(dir.path().to_path_buf()),
        ..DatasetConfig::default()
    }));
    let err = handler.warmup().unwrap_err();
    assert!(matches!(
        &err,
        SearchError::Init(init) if matches!(init.as_ref(), InitError::Inconsistent(_))
    ));
    Ok(())
}

#[test]
fn configured_result_count_above_twenty_is_capped() -> Result<()> {
    let dir = TempDir::new()?;
    let data = dir.path().join("dataset");
    fs::create_dir_all(data.join(INDEX_ROOT))?;
    let rows: Vec<Vec<f32>> = (0..30).map(|i| vec![i as f32 / 30.0]).collect();
    FlatIndex::build(Metric::L2, &rows)?.save(&data.join(INDEX_ROOT).join(INDEX_FILE))?;
    let names: Vec<String> = (0..30).map(|i| format!("g{i}")).collect();
    fs::write(data.join(LABEL_FILE), names.join("\n"))?;

    let config_path = dir.path().join("glyph-search.toml");
    fs::write(
        &config_path,
        format!("[dataset]\nlocal_path = {:?}\n\n[search]\nk = 50\n", data.display().to_string()),
    )?;
    let cfg = load_or_create_config(Some(&config_path))?;
    assert_eq!(cfg.search.k, 50);

    let handler = GlyphSearchHandler::new(
        Arc::new(SearchState::new(DatasetSource::new(cfg.dataset))),
        cfg.search,
    );
    let resp = handler.search(SearchRequest::new("0.5"))?;
    assert_eq!(resp.hits.len(), DEFAULT_RESULT_COUNT);
    assert!(distances_ascending(&resp.hits));
    Ok(())
}

#[test]
fn state_and_handler_are_shareable_across_threads() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<SearchState>();
    is_send_sync::<GlyphSearchHandler>();
}
