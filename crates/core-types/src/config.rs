//! Layered application configuration.
//!
//! Values come from a TOML file (created with defaults when missing), then
//! from the process environment (after `.env` has been loaded by the binary).
//! Environment variables win over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_EPSILON, DEFAULT_RESULT_COUNT};

pub const DEFAULT_CONFIG_PATH: &str = "config/glyph-search.toml";
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

pub const ENV_LOCAL_PATH: &str = "HWR_INDEX_PATH";
pub const ENV_BUCKET: &str = "INDEX_BUCKET_NAME";
pub const ENV_OBJECT: &str = "INDEX_BLOB_NAME";
pub const ENV_FETCH_TIMEOUT: &str = "HWR_FETCH_TIMEOUT_SECS";
pub const ENV_STORAGE_ENDPOINT: &str = "GCS_ENDPOINT";
pub const ENV_ACCESS_TOKEN: &str = "GCS_ACCESS_TOKEN";
pub const ENV_LOG_LEVEL: &str = "GLYPH_SEARCH_LOG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Where the index dataset comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding `anng` and `names.txt`; wins over the remote archive.
    pub local_path: Option<PathBuf>,
    pub bucket: Option<String>,
    pub object: Option<String>,
    pub storage_endpoint: String,
    /// Bearer token for the storage API; anonymous access when unset.
    pub access_token: Option<String>,
    /// Upper bound for downloading and unpacking the remote archive.
    pub fetch_timeout_secs: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            local_path: None,
            bucket: None,
            object: None,
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            access_token: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Bucket/object pair identifying a remote dataset archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArchive {
    pub bucket: String,
    pub object: String,
}

impl std::fmt::Display for RemoteArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}

impl DatasetConfig {
    /// Configured local directory, ignoring empty values.
    pub fn local_dir(&self) -> Option<&Path> {
        self.local_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Remote archive location; both bucket and object must be set.
    pub fn remote_archive(&self) -> Option<RemoteArchive> {
        let bucket = non_empty(self.bucket.as_deref())?;
        let object = non_empty(self.object.as_deref())?;
        Some(RemoteArchive {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of neighbours requested from the index.
    pub k: usize,
    pub epsilon: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_RESULT_COUNT,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `service=debug,info`.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; stderr only when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Load the config file at `path` (or the default location), writing a
/// default file first if none exists, then apply environment overrides.
pub fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?
    } else {
        let cfg = AppConfig::default();
        if let Err(err) = write_default(path, &cfg) {
            tracing::debug!(path = %path.display(), error = %err, "could not write default config");
        }
        cfg
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

fn write_default(path: &Path, cfg: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

/// Overlay environment variables onto `cfg`. `lookup` abstracts the
/// environment so callers can supply their own source.
pub fn apply_env_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = get(ENV_LOCAL_PATH) {
        cfg.dataset.local_path = Some(PathBuf::from(path));
    }
    if let Some(bucket) = get(ENV_BUCKET) {
        cfg.dataset.bucket = Some(bucket);
    }
    if let Some(object) = get(ENV_OBJECT) {
        cfg.dataset.object = Some(object);
    }
    if let Some(endpoint) = get(ENV_STORAGE_ENDPOINT) {
        cfg.dataset.storage_endpoint = endpoint;
    }
    if let Some(token) = get(ENV_ACCESS_TOKEN) {
        cfg.dataset.access_token = Some(token);
    }
    if let Some(raw) = get(ENV_FETCH_TIMEOUT) {
        match raw.trim().parse() {
            Ok(secs) => cfg.dataset.fetch_timeout_secs = secs,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid {ENV_FETCH_TIMEOUT}"),
        }
    }
    if let Some(level) = get(ENV_LOG_LEVEL) {
        cfg.logging.level = level;
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = AppConfig::default();
        cfg.dataset.bucket = Some("from-file".into());
        apply_env_overrides(
            &mut cfg,
            env(&[
                (ENV_BUCKET, "from-env"),
                (ENV_OBJECT, "dataset.tar.gz"),
                (ENV_FETCH_TIMEOUT, "42"),
            ]),
        );
        assert_eq!(cfg.dataset.bucket.as_deref(), Some("from-env"));
        assert_eq!(cfg.dataset.fetch_timeout_secs, 42);
        assert_eq!(
            cfg.dataset.remote_archive(),
            Some(RemoteArchive {
                bucket: "from-env".into(),
                object: "dataset.tar.gz".into(),
            })
        );
    }

    #[test]
    fn empty_values_count_as_unset() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, env(&[(ENV_LOCAL_PATH, ""), (ENV_BUCKET, "b")]));
        assert!(cfg.dataset.local_dir().is_none());
        // object missing, so no remote either
        assert!(cfg.dataset.remote_archive().is_none());
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, env(&[(ENV_FETCH_TIMEOUT, "soon")]));
        assert_eq!(cfg.dataset.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    }

    #[test]
    fn creates_default_file_and_reads_it_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("cfg.toml");
        let first = load_or_create_config(Some(&path))?;
        assert!(path.exists());
        assert_eq!(first.search.k, DEFAULT_RESULT_COUNT);

        fs::write(
            &path,
            "[search]\nk = 5\n\n[logging]\nformat = \"json\"\n",
        )?;
        let second = load_or_create_config(Some(&path))?;
        assert_eq!(second.search.k, 5);
        assert_eq!(second.logging.format, LogFormat::Json);
        assert_eq!(second.dataset.storage_endpoint, DEFAULT_STORAGE_ENDPOINT);
        Ok(())
    }
}
