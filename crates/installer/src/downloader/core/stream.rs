//! Transfer stream sources
//!
//! A [`TransferStream`] is opened for one candidate URL. `file:` URLs read a
//! local file, `http`/`https` URLs issue a request on the shared keep-alive
//! client. Both are drained the same way by [`TransferStream::pipe_to`], which
//! honors pause gates and progress-sink cancellation between chunks.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{
    DownloadError, DownloadRequest, FileOperation, PauseGate, ProgressCallback, ProgressControl,
    Result, TransferProgress,
};

/// An open byte stream for one candidate URL
pub struct TransferStream {
    source: String,
    total: Option<u64>,
    body: BoxStream<'static, Result<Bytes>>,
}

impl TransferStream {
    /// Open `url` using the options of `request`
    pub async fn open(
        client: &Client,
        config: &DownloadConfig,
        url: &str,
        request: &DownloadRequest,
    ) -> Result<Self> {
        let parsed = url::Url::parse(url).map_err(|e| DownloadError::invalid_url(url, e))?;
        match parsed.scheme() {
            "file" => Self::open_local(&parsed, url, config).await,
            "http" | "https" => Self::open_network(client, config, url, request).await,
            other => Err(DownloadError::UnsupportedUrl {
                url: url.to_string(),
                scheme: other.to_string(),
                supported_schemes: "file, http, https".to_string(),
            }),
        }
    }

    async fn open_local(parsed: &url::Url, url: &str, config: &DownloadConfig) -> Result<Self> {
        let path = parsed.to_file_path().map_err(|_| DownloadError::UnsupportedUrl {
            url: url.to_string(),
            scheme: "file".to_string(),
            supported_schemes: "file URLs with a local absolute path".to_string(),
        })?;

        let file = fs::File::open(&path)
            .await
            .map_err(|e| DownloadError::fs(&path, FileOperation::Read, e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| DownloadError::fs(&path, FileOperation::Metadata, e))?
            .len();
        debug!("Opened local source {} ({} bytes)", path.display(), total);

        let body = ReaderStream::with_capacity(file, config.buffer_size)
            .map(move |chunk| chunk.map_err(|e| DownloadError::fs(&path, FileOperation::Read, e)))
            .boxed();

        Ok(Self {
            source: url.to_string(),
            total: Some(total),
            body,
        })
    }

    async fn open_network(
        client: &Client,
        config: &DownloadConfig,
        url: &str,
        request: &DownloadRequest,
    ) -> Result<Self> {
        let timeout = request.timeout.unwrap_or(config.timeout);
        let timeout_secs = timeout.as_secs();

        let mut builder = client.request(request.method.clone(), url).timeout(timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        debug!("Opened {} (content length: {:?})", url, total);

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| DownloadError::from_reqwest(&owned_url, e, timeout_secs)))
            .boxed();

        Ok(Self {
            source: url.to_string(),
            total,
            body,
        })
    }

    /// Declared size of the stream, if known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Drain the stream into a freshly created file at `path`.
    ///
    /// Returns the number of bytes written. A `Cancel` from `progress` stops
    /// the transfer with [`DownloadError::Cancelled`].
    pub async fn pipe_to(
        mut self,
        path: &Path,
        progress: Option<&ProgressCallback>,
        mut gate: Option<PauseGate>,
    ) -> Result<u64> {
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| DownloadError::fs(path, FileOperation::Create, e))?;

        let mut transferred = 0u64;
        loop {
            if let Some(gate) = gate.as_mut() {
                gate.wait_resumed().await;
            }

            let chunk = match self.body.next().await {
                Some(chunk) => chunk?,
                None => break,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::fs(path, FileOperation::Write, e))?;
            transferred += chunk.len() as u64;

            if let Some(sink) = progress {
                let tick = TransferProgress {
                    chunk: chunk.len() as u64,
                    transferred,
                    total: self.total,
                    source: self.source.clone(),
                };
                if sink.on_progress(&tick) == ProgressControl::Cancel {
                    debug!("Progress sink cancelled transfer of {}", self.source);
                    return Err(DownloadError::Cancelled);
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::fs(path, FileOperation::Write, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::fs(path, FileOperation::Write, e))?;

        Ok(transferred)
    }
}
