//! Example demonstrating a batch of mirrored downloads
//!
//! Downloads a few files with a fallback mirror each, skipping the ones that
//! already match their checksum, and prints the aggregated failures.
//!
//! Run this example with:
//! ```
//! cargo run --example batch_download_example
//! ```
//!
//! `INSTALLER_EXAMPLE_BASE_URL` overrides the primary mirror
//! (default `https://httpbin.org`).

use asset_installer::{
    download_all, join_url, BatchError, DefaultDownloader, DownloadConfig, DownloadPolicy,
    DownloadRequest, IntoTaskListener, TaskContext, TracingTaskReporter,
};
use std::sync::Arc;
use tempfile::tempdir;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let base = std::env::var("INSTALLER_EXAMPLE_BASE_URL")
        .unwrap_or_else(|_| "https://httpbin.org".to_string());
    let mirror = "https://mirror.invalid";

    let temp_dir = tempdir()?;
    println!("Download directory: {}", temp_dir.path().display());

    let requests: Vec<DownloadRequest> = [1024, 10 * 1024, 100 * 1024]
        .iter()
        .map(|size| {
            let route = format!("/bytes/{}", size);
            DownloadRequest::new(join_url(&base, &route), temp_dir.path().join(format!("{}.bin", size)))
                .with_mirror_url(join_url(mirror, &route))
                .with_retry(2)
        })
        .chain(std::iter::once(DownloadRequest::new(
            join_url(&base, "/status/404"),
            temp_dir.path().join("missing.bin"),
        )))
        .collect();

    let downloader = Arc::new(DefaultDownloader::new(DownloadConfig::from_env())?);
    let policy = DownloadPolicy::new()
        .with_max_concurrency(3)
        .with_downloader(downloader.clone());

    let ctx = TaskContext::with_listener("example", TracingTaskReporter::new(false).into_listener());
    let started = Instant::now();

    match download_all(&ctx, requests, &policy).await {
        Ok(()) => println!("All downloads finished"),
        Err(BatchError::Aggregated(aggregated)) => {
            println!("{}", aggregated);
            for error in aggregated.errors() {
                println!("  - {}", error);
            }
        }
        Err(e) => return Err(e.into()),
    }

    let metrics = downloader.metrics().snapshot();
    println!(
        "{} items done in {:?}: {} bytes, {} mirror fallbacks, {} retries",
        ctx.progress(),
        started.elapsed(),
        metrics.total_bytes,
        metrics.mirror_fallbacks,
        metrics.retries_attempted,
    );

    Ok(())
}
