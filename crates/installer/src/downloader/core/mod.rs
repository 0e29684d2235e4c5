//! Core types used throughout the downloader system
//!
//! This module contains the fundamental types that all other modules depend on.
//! By organizing these in a core module, we make the dependency relationships clear.

pub mod error;
pub mod files;
pub mod http;
pub mod metrics;
pub mod progress;
pub mod stream;
pub mod validation;

pub use error::{DownloadError, ErrorSeverity, FileOperation, Result};
pub use http::{Conditional, Timestamped};
pub use metrics::{DownloadMetrics, DownloadMetricsSnapshot};
pub use progress::{
    pause_pair, PauseGate, PauseHandle, PauseRegistrar, ProgressCallback, ProgressControl,
    ProgressSink, TransferProgress,
};
pub use validation::{Checksum, ChecksumAlgorithm, OverwritePolicy};

use reqwest::Method;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A download request containing all necessary information
///
/// Every candidate URL targets the same destination; whichever candidate
/// succeeds first fully determines the file content.
#[derive(Clone)]
pub struct DownloadRequest {
    /// Candidate URLs, tried in order until one succeeds
    pub urls: Vec<String>,
    /// Final path of the file on disk
    pub destination: PathBuf,
    pub method: Method,
    pub headers: HashMap<String, String>,
    /// Whole-request timeout; falls back to the downloader configuration
    pub timeout: Option<Duration>,
    /// Extra attempts on the same candidate for recoverable failures
    pub retry: usize,
    pub checksum: Option<Checksum>,
    pub progress: Option<ProgressCallback>,
    pub pausable: Option<PauseRegistrar>,
}

impl DownloadRequest {
    /// Create a new download request with one URL and a destination file
    pub fn new<S: Into<String>, P: Into<PathBuf>>(url: S, destination: P) -> Self {
        Self::from_candidates(vec![url.into()], destination)
    }

    /// Create a request from an ordered list of candidate URLs
    pub fn from_candidates<I, S, P>(urls: I, destination: P) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            destination: destination.into(),
            method: Method::GET,
            headers: HashMap::new(),
            timeout: None,
            retry: 0,
            checksum: None,
            progress: None,
            pausable: None,
        }
    }

    /// Append a fallback URL tried after every earlier candidate failed
    pub fn with_mirror_url<S: Into<String>>(mut self, mirror_url: S) -> Self {
        self.urls.push(mirror_url.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: usize) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_progress<S: ProgressSink + 'static>(mut self, sink: S) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn with_pausable<F>(mut self, register: F) -> Self
    where
        F: Fn(Option<PauseHandle>) + Send + Sync + 'static,
    {
        self.pausable = Some(Arc::new(register));
        self
    }

    /// The first candidate URL, if any
    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("urls", &self.urls)
            .field("destination", &self.destination)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("checksum", &self.checksum)
            .field("progress", &self.progress.is_some())
            .field("pausable", &self.pausable.is_some())
            .finish()
    }
}
