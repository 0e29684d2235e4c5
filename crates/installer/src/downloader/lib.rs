//! Downloader contract and the default network-backed implementation
//!
//! The call chain for one request:
//!
//! Caller / task adapter
//! ↓
//! Downloader::download_file (this file, mirror fallback)
//! ↓
//! retry_with_backoff (core/http.rs, per candidate)
//! ↓
//! TransferStream (core/stream.rs) → `.part` file → verify → rename

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{
    files, http, pause_pair, validation, DownloadError, DownloadMetrics, DownloadRequest, Result,
};
use crate::downloader::core::stream::TransferStream;

/// Produces the file named by a request's destination
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Try each candidate URL in order until one fully writes the destination.
    ///
    /// Cancellation stops the chain immediately. When every candidate fails,
    /// the last candidate's error is returned.
    async fn download_file(&self, request: &DownloadRequest) -> Result<()>;
}

/// Network downloader sharing one keep-alive client across all requests
pub struct DefaultDownloader {
    client: Client,
    config: DownloadConfig,
    metrics: Arc<DownloadMetrics>,
}

impl DefaultDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = http::build_client(&config)?;
        Ok(Self::with_client(client, config))
    }

    /// Use an already configured client
    pub fn with_client(client: Client, config: DownloadConfig) -> Self {
        Self {
            client,
            config,
            metrics: Arc::new(DownloadMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &DownloadMetrics {
        &self.metrics
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// One attempt at one candidate, leaving either the finished destination
    /// or nothing behind
    async fn fetch_candidate(&self, url: &str, request: &DownloadRequest) -> Result<u64> {
        let temp_path = files::create_temp_path(&request.destination);
        let result = self.transfer(url, request, &temp_path).await;
        if result.is_err() {
            files::discard_partial(&temp_path).await;
        }
        result
    }

    async fn transfer(
        &self,
        url: &str,
        request: &DownloadRequest,
        temp_path: &std::path::Path,
    ) -> Result<u64> {
        self.metrics.record_stream_opened();
        let stream = TransferStream::open(&self.client, &self.config, url, request).await?;

        let gate = match &request.pausable {
            Some(register) => {
                let (handle, gate) = pause_pair();
                register(Some(handle));
                Some(gate)
            }
            None => None,
        };

        let written = stream.pipe_to(temp_path, request.progress.as_ref(), gate).await?;

        if self.config.verify_after_download {
            if let Some(checksum) = request.checksum.as_ref().filter(|c| !c.is_empty()) {
                validation::verify_file(temp_path, checksum).await.map_err(|e| match e {
                    DownloadError::ChecksumMismatch { algorithm, expected, actual, .. } => {
                        DownloadError::ChecksumMismatch {
                            file: request.destination.clone(),
                            algorithm,
                            expected,
                            actual,
                        }
                    }
                    other => other,
                })?;
                debug!("Verified {} against {}", request.destination.display(), checksum.algorithm);
            }
        }

        files::atomic_rename(temp_path, &request.destination).await?;
        Ok(written)
    }
}

#[async_trait]
impl Downloader for DefaultDownloader {
    async fn download_file(&self, request: &DownloadRequest) -> Result<()> {
        if request.urls.is_empty() {
            return Err(DownloadError::NoCandidates {
                destination: request.destination.clone(),
            });
        }

        let span = info_span!(
            "download_file",
            destination = %request.destination.display(),
            candidates = request.urls.len()
        );

        async move {
            files::ensure_parent_dir(&request.destination).await?;

            let mut last_error = None;
            for (index, url) in request.urls.iter().enumerate() {
                if index > 0 {
                    self.metrics.record_mirror_fallback();
                    info!("Trying mirror {}/{}: {}", index + 1, request.urls.len(), url);
                }

                let attempt = http::retry_with_backoff(
                    || self.fetch_candidate(url, request),
                    &self.config,
                    &self.metrics,
                    request.retry,
                    url,
                )
                .await;

                match attempt {
                    Ok(size) => {
                        self.metrics.record_download_completed(size);
                        debug!("Downloaded {} bytes from {}", size, url);
                        return Ok(());
                    }
                    Err(e) if e.aborts_fallback() => {
                        self.metrics.record_download_failed();
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("Candidate {} failed: {}", url, e);
                        last_error = Some(e);
                    }
                }
            }

            self.metrics.record_download_failed();
            Err(last_error.unwrap_or_else(|| DownloadError::NoCandidates {
                destination: request.destination.clone(),
            }))
        }
        .instrument(span)
        .await
    }
}

/// Build a [`DefaultDownloader`] from the environment-aware configuration
pub fn default_downloader() -> Result<Arc<dyn Downloader>> {
    let downloader = DefaultDownloader::new(DownloadConfig::from_env())?;
    Ok(Arc::new(downloader))
}
