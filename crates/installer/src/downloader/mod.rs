//! Downloader module
//!
//! This module contains all the download functionality including
//! core types, configuration, the task adapter, and batch operations.

pub mod core;
pub mod config;
pub mod batch;
pub mod task;
pub mod r#lib;

// Re-export main types for convenience
pub use r#lib::{default_downloader, DefaultDownloader, Downloader};
pub use self::core::{
    DownloadRequest, Checksum, ChecksumAlgorithm, OverwritePolicy,
    ProgressCallback, ProgressControl, ProgressSink, TransferProgress,
    PauseHandle, PauseRegistrar, Conditional, Timestamped,
    DownloadError, Result, ErrorSeverity, FileOperation,
    DownloadMetrics, DownloadMetricsSnapshot,
};
pub use self::core::http::{fetch_if_updated, fetch_json_if_updated, fetch_text_if_updated, join_url};
pub use self::core::validation::{compute_digest, should_fetch, verify_file};
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use batch::{download_all, run_batch, AggregatedError, BatchError, DownloadPolicy, WorkItem};
pub use task::{download_file_task, fetch_if_needed, DownloadTask, FetchOutcome};

#[cfg(test)]
mod tests;
