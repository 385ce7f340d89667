//! Remote dataset archives.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use core_types::config::{DatasetConfig, RemoteArchive};
use reqwest::Url;
use reqwest::blocking::Client;

use crate::error::FetchError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens a byte stream for a remote gzip/tar dataset archive.
pub trait ArchiveFetcher: Send + Sync {
    fn fetch(&self, remote: &RemoteArchive) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// Fetches objects through the Cloud Storage JSON API.
#[derive(Debug, Clone)]
pub struct GcsFetcher {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl GcsFetcher {
    pub fn from_config(cfg: &DatasetConfig) -> Result<Self, FetchError> {
        let timeout = cfg.fetch_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            endpoint: cfg.storage_endpoint.clone(),
            access_token: cfg.access_token.clone(),
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{object}?alt=media`, with each
    /// segment percent-encoded (object names may contain `/`).
    pub fn object_url(&self, remote: &RemoteArchive) -> Result<Url, FetchError> {
        let endpoint_err = |reason: String| FetchError::Endpoint {
            endpoint: self.endpoint.clone(),
            reason,
        };
        let mut url = Url::parse(&self.endpoint).map_err(|e| endpoint_err(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| endpoint_err("endpoint cannot be a base url".into()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", remote.bucket.as_str(), "o", remote.object.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl ArchiveFetcher for GcsFetcher {
    fn fetch(&self, remote: &RemoteArchive) -> Result<Box<dyn Read + Send>, FetchError> {
        let url = self.object_url(remote)?;
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        tracing::debug!(%url, length = ?response.content_length(), "dataset archive response received");
        Ok(Box::new(response))
    }
}

/// Reader that fails with `TimedOut` once a deadline has passed, bounding
/// the whole download-and-extract step regardless of the fetcher.
pub(crate) struct DeadlineReader<R> {
    inner: R,
    deadline: Instant,
}

impl<R: Read> DeadlineReader<R> {
    pub(crate) fn new(inner: R, budget: Duration) -> Self {
        Self {
            inner,
            deadline: Instant::now() + budget,
        }
    }
}

impl<R: Read> Read for DeadlineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if Instant::now() >= self.deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "dataset fetch exceeded its time budget",
            ));
        }
        self.inner.read(buf)
    }
}
