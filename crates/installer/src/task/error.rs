use thiserror::Error;

use crate::downloader::core::DownloadError;

/// Failure of one task unit
#[derive(Error, Debug)]
pub enum TaskError {
    /// The task or one of its ancestors was cancelled
    #[error("Task cancelled")]
    Cancelled,

    #[error(transparent)]
    Download(DownloadError),

    /// Failure raised by caller-defined tasks
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// The download failure behind this error, if any
    pub fn as_download(&self) -> Option<&DownloadError> {
        match self {
            TaskError::Download(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DownloadError> for TaskError {
    fn from(error: DownloadError) -> Self {
        match error {
            DownloadError::Cancelled => TaskError::Cancelled,
            other => TaskError::Download(other),
        }
    }
}
