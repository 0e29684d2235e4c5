//! Counters kept by the default downloader
//!
//! Updated from concurrent workers with relaxed atomics; read them through
//! [`DownloadMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Transfer statistics for one downloader instance
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    bytes_written: AtomicU64,
    /// One per candidate attempt, retries included
    streams_opened: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl DownloadMetrics {
    pub fn record_stream_opened(&self) {
        bump(&self.streams_opened, 1);
    }

    /// A request finished with `size` bytes at its destination
    pub fn record_download_completed(&self, size: u64) {
        bump(&self.completed, 1);
        bump(&self.bytes_written, size);
    }

    /// Every candidate of a request failed
    pub fn record_download_failed(&self) {
        bump(&self.failed, 1);
    }

    pub fn record_retry(&self) {
        bump(&self.retries, 1);
    }

    pub fn record_mirror_fallback(&self) {
        bump(&self.fallbacks, 1);
    }

    pub fn snapshot(&self) -> DownloadMetricsSnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        DownloadMetricsSnapshot {
            total_bytes: read(&self.bytes_written),
            streams_opened: read(&self.streams_opened),
            successful_downloads: read(&self.completed),
            failed_downloads: read(&self.failed),
            retries_attempted: read(&self.retries),
            mirror_fallbacks: read(&self.fallbacks),
        }
    }
}

/// Point-in-time copy of [`DownloadMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadMetricsSnapshot {
    pub total_bytes: u64,
    pub streams_opened: u64,
    pub successful_downloads: u64,
    pub failed_downloads: u64,
    pub retries_attempted: u64,
    pub mirror_fallbacks: u64,
}

impl DownloadMetricsSnapshot {
    /// Share of finished requests that succeeded, `0.0` before any finished
    pub fn success_rate(&self) -> f64 {
        match self.successful_downloads + self.failed_downloads {
            0 => 0.0,
            finished => self.successful_downloads as f64 / finished as f64,
        }
    }
}
