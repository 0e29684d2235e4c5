//! HTTP utilities
//!
//! Shared client construction, per-candidate retry with backoff, and the
//! `If-Modified-Since` conditional fetch used for metadata lists.

use bytes::Bytes;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{DownloadError, DownloadMetrics, Result};

/// Build the keep-alive client used for every network stream of a downloader
pub fn build_client(config: &DownloadConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
        .map_err(|e| DownloadError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
            field: None,
        })
}

/// Run `operation` up to `1 + retries` times while it fails recoverably
pub(crate) async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    config: &DownloadConfig,
    metrics: &DownloadMetrics,
    retries: usize,
    url: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= retries || !e.is_recoverable() => return Err(e),
            Err(e) => {
                let delay = config.get_retry_delay(attempt);
                attempt += 1;
                metrics.record_retry();
                debug!("Retry attempt {}/{} for {} after {:?}: {}", attempt, retries, url, delay, e);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Outcome of a conditional GET
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    /// The resource changed (or no timestamp was sent)
    Updated {
        content: T,
        last_modified: Option<String>,
    },
    /// The server answered 304 for the given timestamp
    NotModified { last_modified: Option<String> },
}

// The caller's client owns any overall timeout, so there is no duration to report.
fn request_error(url: &str, source: reqwest::Error) -> DownloadError {
    DownloadError::HttpRequest { url: url.to_string(), source }
}

/// Fetch `url` unless it is unchanged since `last_modified`
pub async fn fetch_if_updated(
    client: &Client,
    url: &str,
    last_modified: Option<&str>,
) -> Result<Conditional<Bytes>> {
    let mut builder = client.get(url);
    if let Some(timestamp) = last_modified {
        builder = builder.header(IF_MODIFIED_SINCE, timestamp);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| request_error(url, e))?;

    let returned = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if response.status() == StatusCode::NOT_MODIFIED {
        debug!("{} not modified since {:?}", url, last_modified);
        return Ok(Conditional::NotModified { last_modified: returned });
    }
    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let content = response
        .bytes()
        .await
        .map_err(|e| request_error(url, e))?;
    Ok(Conditional::Updated { content, last_modified: returned })
}

/// Text variant of [`fetch_if_updated`]
pub async fn fetch_text_if_updated(
    client: &Client,
    url: &str,
    last_modified: Option<&str>,
) -> Result<Conditional<String>> {
    Ok(match fetch_if_updated(client, url, last_modified).await? {
        Conditional::Updated { content, last_modified } => Conditional::Updated {
            content: String::from_utf8_lossy(&content).into_owned(),
            last_modified,
        },
        Conditional::NotModified { last_modified } => Conditional::NotModified { last_modified },
    })
}

/// A parsed document together with the `Last-Modified` it was served with
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    pub timestamp: String,
    pub value: T,
}

/// Refresh a cached JSON document, reusing `cached` when the server reports
/// no change
pub async fn fetch_json_if_updated<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    cached: Option<Timestamped<T>>,
) -> Result<Timestamped<T>> {
    let since = cached.as_ref().map(|c| c.timestamp.as_str());
    match fetch_text_if_updated(client, url, since).await? {
        Conditional::Updated { content, last_modified } => {
            let value = serde_json::from_str(&content).map_err(|e| DownloadError::InvalidContent {
                url: url.to_string(),
                source: e,
            })?;
            Ok(Timestamped {
                timestamp: last_modified.unwrap_or_default(),
                value,
            })
        }
        Conditional::NotModified { .. } => cached.ok_or_else(|| DownloadError::HttpStatus {
            url: url.to_string(),
            status: StatusCode::NOT_MODIFIED.as_u16(),
        }),
    }
}

/// Concatenate two URL parts with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}
