//! Installer Library
//!
//! Downloads game and launcher assets from ordered mirror lists, skips files
//! whose checksum already matches, and runs many downloads as one
//! bounded-concurrency batch that reports every failure at the end.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use asset_installer::{
//!     download_all, Checksum, DownloadPolicy, DownloadRequest, IntoTaskListener,
//!     TaskContext, TracingTaskReporter,
//! };
//!
//! # async fn example() -> Result<(), asset_installer::BatchError> {
//! let requests = vec![
//!     DownloadRequest::new(
//!         "https://libraries.example.com/com/example/lib/1.0/lib-1.0.jar",
//!         "libraries/com/example/lib/1.0/lib-1.0.jar",
//!     )
//!     .with_mirror_url("https://mirror.example.com/com/example/lib/1.0/lib-1.0.jar")
//!     .with_checksum(Checksum::sha1("2c6f0ef2b4bd0b1b7f7c8c0cd9a8a7e1c3b0e8f1")),
//! ];
//!
//! let ctx = TaskContext::with_listener("install", TracingTaskReporter::default().into_listener());
//! let policy = DownloadPolicy::new().with_max_concurrency(8);
//!
//! download_all(&ctx, requests, &policy).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Mirror fallback**: candidates are tried in order; cancellation stops the chain
//! - **Checksum-conditional fetch**: sha1, sha256, sha512, md5 and xxh64
//! - **Atomic writes**: bytes land in a `.part` file that is verified and renamed
//! - **Pause/resume and cancellation**: through the running [`TaskContext`]
//! - **Batch downloads**: bounded workers with fail-fast or aggregated failures
//! - **Conditional GET**: `If-Modified-Since` refresh of cached metadata

pub mod downloader;
pub mod task;

// Re-export commonly used types for convenience
pub use downloader::{
    default_downloader, download_all, download_file_task, fetch_if_needed, fetch_if_updated,
    fetch_json_if_updated, fetch_text_if_updated, join_url, run_batch, should_fetch,
    AggregatedError, BatchError, Checksum, ChecksumAlgorithm, DefaultDownloader, DownloadConfig,
    DownloadError, DownloadPolicy, DownloadRequest, Downloader, FetchOutcome, OverwritePolicy,
    PauseHandle, ProgressControl, Result, TransferProgress, WorkItem,
};
pub use task::{
    task_fn, IntoTaskListener, Task, TaskContext, TaskError, TaskEvent, TracingTaskReporter,
};
