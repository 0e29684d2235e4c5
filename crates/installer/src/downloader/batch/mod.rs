//! Bounded-concurrency batch execution
//!
//! A batch runs its work items on a fixed number of workers sharing one
//! queue. Failures are either collected into an [`AggregatedError`] or, with
//! `fail_fast` or on cancellation, returned at once while the remaining
//! workers are dropped.

pub mod aggregate;

pub use aggregate::{AggregatedError, BatchError};

use futures::future::try_join_all;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};

use crate::downloader::core::{DownloadRequest, OverwritePolicy, Result};
use crate::downloader::task::DownloadTask;
use crate::downloader::{default_downloader, Downloader};
use crate::task::{Task, TaskContext, TaskError};

/// Options shared by every item of a batch
#[derive(Clone, Default)]
pub struct DownloadPolicy {
    pub overwrite: OverwritePolicy,
    /// Stop at the first failure instead of collecting them
    pub fail_fast: bool,
    /// Worker count; defaults to three per available core
    pub max_concurrency: Option<usize>,
    /// Downloader used by download tasks; the default one when `None`
    pub downloader: Option<Arc<dyn Downloader>>,
}

impl DownloadPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// The configured downloader, or a fresh default one
    pub fn downloader(&self) -> Result<Arc<dyn Downloader>> {
        match &self.downloader {
            Some(downloader) => Ok(downloader.clone()),
            None => default_downloader(),
        }
    }
}

impl fmt::Debug for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadPolicy")
            .field("overwrite", &self.overwrite)
            .field("fail_fast", &self.fail_fast)
            .field("max_concurrency", &self.max_concurrency)
            .field("downloader", &self.downloader.is_some())
            .finish()
    }
}

/// One queued task and its share of the batch progress
pub struct WorkItem {
    pub task: Box<dyn Task>,
    pub weight: u64,
}

impl WorkItem {
    pub fn new<T: Task + 'static>(task: T, weight: u64) -> Self {
        Self { task: Box::new(task), weight }
    }
}

/// Number of workers for `pending` items
pub fn effective_concurrency(pending: usize, max_concurrency: Option<usize>) -> usize {
    let max = max_concurrency.unwrap_or_else(|| {
        std::thread::available_parallelism().map_or(1, |n| n.get()) * 3
    });
    max.min(pending).max(1)
}

/// Run `items` under `ctx` with at most the policy's concurrency.
///
/// `summary` builds the aggregated message from the collected failures and is
/// only called when at least one item failed.
pub async fn run_batch<F>(
    ctx: &TaskContext,
    items: Vec<WorkItem>,
    policy: &DownloadPolicy,
    summary: F,
) -> std::result::Result<(), BatchError>
where
    F: FnOnce(&[TaskError]) -> String,
{
    let total: u64 = items.iter().map(|item| item.weight).sum();
    ctx.update(0, Some(total), None);

    let workers = effective_concurrency(items.len(), policy.max_concurrency);
    let span = info_span!("batch", path = ctx.path(), items = items.len(), workers);

    let queue = Mutex::new(items.into_iter().collect::<VecDeque<_>>());
    let failures = Mutex::new(Vec::new());

    try_join_all((0..workers).map(|id| worker(id, ctx, &queue, &failures, policy.fail_fast)))
        .instrument(span)
        .await?;

    let errors = failures.into_inner();
    if errors.is_empty() {
        return Ok(());
    }

    let message = summary(&errors);
    info!("{}", message);
    Err(BatchError::Aggregated(AggregatedError::new(message, errors)))
}

async fn worker(
    id: usize,
    ctx: &TaskContext,
    queue: &Mutex<VecDeque<WorkItem>>,
    failures: &Mutex<Vec<TaskError>>,
    fail_fast: bool,
) -> std::result::Result<(), BatchError> {
    loop {
        if ctx.is_cancelled() {
            return Err(BatchError::Task(TaskError::Cancelled));
        }

        let Some(item) = queue.lock().await.pop_front() else {
            debug!("Worker {} drained the queue", id);
            return Ok(());
        };

        match ctx.execute(item.task.as_ref(), item.weight).await {
            Ok(()) => {}
            Err(e) if fail_fast || e.is_cancelled() => return Err(BatchError::Task(e)),
            Err(e) => {
                debug!("Worker {} collected failure of {}: {}", id, item.task.name(), e);
                failures.lock().await.push(e);
            }
        }
    }
}

/// Download every request, skipping destinations the oracle accepts
pub async fn download_all(
    ctx: &TaskContext,
    requests: Vec<DownloadRequest>,
    policy: &DownloadPolicy,
) -> std::result::Result<(), BatchError> {
    let downloader = policy.downloader().map_err(TaskError::from)?;
    let count = requests.len();

    let items = requests
        .into_iter()
        .map(|request| WorkItem::new(DownloadTask::new(request, downloader.clone(), policy.overwrite), 1))
        .collect();

    run_batch(ctx, items, policy, |errors| {
        format!("{} of {} downloads failed", errors.len(), count)
    })
    .await
}
