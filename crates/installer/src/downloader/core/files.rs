//! File operation utilities
//!
//! Transfers are written to a sibling `.part` file and renamed onto the
//! destination only once complete, so an interrupted transfer never leaves a
//! truncated file at the destination path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Create the parent directories of `dest_path`
pub async fn ensure_parent_dir(dest_path: &Path) -> Result<()> {
    if let Some(parent) = dest_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::fs(parent, FileOperation::CreateDir, e))?;
    }
    Ok(())
}

/// Path of the in-progress file for `dest_path` (`<name>.part`)
pub fn create_temp_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest_path.with_file_name(name)
}

/// Atomically rename a temporary file to its final destination
pub async fn atomic_rename(temp_path: &Path, dest_path: &Path) -> Result<()> {
    fs::rename(temp_path, dest_path)
        .await
        .map_err(|e| DownloadError::fs(dest_path, FileOperation::Rename, e))?;
    debug!("Atomically renamed {} to {}", temp_path.display(), dest_path.display());
    Ok(())
}

/// Best-effort removal of a partial file after a failed transfer
pub async fn discard_partial(temp_path: &Path) {
    match fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed partial file {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", temp_path.display(), e),
    }
}
