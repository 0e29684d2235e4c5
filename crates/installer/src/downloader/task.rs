//! Binds one download request to a task unit
//!
//! The adapter forwards transfer progress into the running [`TaskContext`],
//! exposes the live transfer's pause handle through it, and consults the
//! existence/checksum oracle before touching the network.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::downloader::batch::DownloadPolicy;
use crate::downloader::core::{
    validation, DownloadRequest, OverwritePolicy, PauseHandle, PauseRegistrar, ProgressCallback,
    ProgressControl, Result, TransferProgress,
};
use crate::downloader::Downloader;
use crate::task::{Task, TaskContext, TaskError};

/// What [`fetch_if_needed`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    /// The destination already satisfied the overwrite policy
    Skipped,
}

/// Download `request` unless the destination is already acceptable
pub async fn fetch_if_needed(
    downloader: &dyn Downloader,
    request: &DownloadRequest,
    overwrite: OverwritePolicy,
) -> Result<FetchOutcome> {
    let needed = validation::should_fetch(&request.destination, request.checksum.as_ref(), overwrite).await?;
    if !needed {
        debug!("Keeping existing {}", request.destination.display());
        return Ok(FetchOutcome::Skipped);
    }

    downloader.download_file(request).await?;
    Ok(FetchOutcome::Fetched)
}

/// A download request ready to run under a task context
pub struct DownloadTask {
    name: String,
    request: DownloadRequest,
    downloader: Arc<dyn Downloader>,
    overwrite: OverwritePolicy,
}

impl DownloadTask {
    pub fn new(request: DownloadRequest, downloader: Arc<dyn Downloader>, overwrite: OverwritePolicy) -> Self {
        let name = request
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        Self { name, request, downloader, overwrite }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Copy of the request with its sink and registrar chained to `ctx`
    fn bind(&self, ctx: &TaskContext) -> DownloadRequest {
        let mut request = self.request.clone();

        let caller_sink = request.progress.take();
        let progress_ctx = ctx.clone();
        let sink: ProgressCallback = Arc::new(move |p: &TransferProgress| {
            if let Some(sink) = &caller_sink {
                if sink.on_progress(p) == ProgressControl::Cancel {
                    return ProgressControl::Cancel;
                }
            }
            progress_ctx.update(p.transferred, p.total, Some(&p.source));
            if progress_ctx.is_cancelled() {
                ProgressControl::Cancel
            } else {
                ProgressControl::Continue
            }
        });
        request.progress = Some(sink);

        let caller_registrar = request.pausable.take();
        let pause_ctx = ctx.clone();
        let registrar: PauseRegistrar = Arc::new(move |handle: Option<PauseHandle>| {
            if let Some(register) = &caller_registrar {
                register(handle.clone());
            }
            pause_ctx.register_pause(handle);
        });
        request.pausable = Some(registrar);

        request
    }
}

#[async_trait]
impl Task for DownloadTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext) -> std::result::Result<(), TaskError> {
        let request = self.bind(ctx);
        let result = fetch_if_needed(self.downloader.as_ref(), &request, self.overwrite).await;

        // Stale pause calls after this point must be no-ops.
        if let Some(register) = &request.pausable {
            register(None);
        }

        result.map(|_| ()).map_err(TaskError::from)
    }
}

/// Wrap `request` as a task using the policy's downloader and overwrite mode
pub fn download_file_task(request: DownloadRequest, policy: &DownloadPolicy) -> Result<DownloadTask> {
    Ok(DownloadTask::new(request, policy.downloader()?, policy.overwrite))
}
