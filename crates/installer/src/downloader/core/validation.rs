//! Checksum computation and the re-download decision policy

use crate::downloader::core::error::{DownloadError, FileOperation, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Expected digest of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Algorithm name, e.g. `sha1`
    pub algorithm: String,
    /// Expected digest as hex
    pub hash: String,
}

impl Checksum {
    pub fn new<A: Into<String>, H: Into<String>>(algorithm: A, hash: H) -> Self {
        Self {
            algorithm: algorithm.into(),
            hash: hash.into(),
        }
    }

    pub fn sha1<H: Into<String>>(hash: H) -> Self {
        Self::new("sha1", hash)
    }

    /// An empty hash carries no information and is treated as absent
    pub fn is_empty(&self) -> bool {
        self.hash.trim().is_empty()
    }
}

/// Digest algorithms the oracle can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Md5,
    Xxh64,
}

impl FromStr for ChecksumAlgorithm {
    type Err = DownloadError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "xxh64" | "xxhash64" => Ok(ChecksumAlgorithm::Xxh64),
            _ => Err(DownloadError::UnsupportedAlgorithm {
                algorithm: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Xxh64 => "xxh64",
        };
        f.write_str(name)
    }
}

enum DigestState {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
    Xxh64(Box<Xxh64>),
}

impl DigestState {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
            ChecksumAlgorithm::Md5 => DigestState::Md5(Md5::new()),
            ChecksumAlgorithm::Xxh64 => DigestState::Xxh64(Box::new(Xxh64::new(0))),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Sha1(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
            DigestState::Md5(h) => h.update(data),
            DigestState::Xxh64(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            DigestState::Sha1(h) => hex::encode(h.finalize()),
            DigestState::Sha256(h) => hex::encode(h.finalize()),
            DigestState::Sha512(h) => hex::encode(h.finalize()),
            DigestState::Md5(h) => hex::encode(h.finalize()),
            DigestState::Xxh64(h) => format!("{:016x}", h.digest()),
        }
    }
}

/// Stream a file through `algorithm` and return the lowercase hex digest
pub async fn compute_digest<P: AsRef<Path>>(path: P, algorithm: ChecksumAlgorithm) -> Result<String> {
    let path = path.as_ref();
    let mut file = fs::File::open(path)
        .await
        .map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;

    let mut state = DigestState::new(algorithm);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;
        if read == 0 {
            break;
        }
        state.update(&buffer[..read]);
    }

    Ok(state.finalize_hex())
}

/// Check a file against an expected checksum.
///
/// Returns the computed digest on mismatch as `ChecksumMismatch`.
pub async fn verify_file<P: AsRef<Path>>(path: P, checksum: &Checksum) -> Result<()> {
    let path = path.as_ref();
    let algorithm: ChecksumAlgorithm = checksum.algorithm.parse()?;
    let actual = compute_digest(path, algorithm).await?;
    let expected = checksum.hash.trim().to_ascii_lowercase();

    if actual == expected {
        debug!("Checksum {} verified for {}", algorithm, path.display());
        Ok(())
    } else {
        Err(DownloadError::ChecksumMismatch {
            file: path.to_path_buf(),
            algorithm: algorithm.to_string(),
            expected,
            actual,
        })
    }
}

/// When an already present destination file is fetched again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverwritePolicy {
    /// Only refetch files whose checksum is provided and does not match
    #[default]
    ChecksumNotMatch,
    /// Also refetch files that have no checksum to compare against
    ChecksumNotMatchOrEmpty,
    /// Always refetch
    Always,
}

async fn exists(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DownloadError::fs(path, FileOperation::Metadata, e)),
    }
}

/// Decide whether `destination` needs to be (re)fetched
pub async fn should_fetch(
    destination: &Path,
    checksum: Option<&Checksum>,
    overwrite: OverwritePolicy,
) -> Result<bool> {
    if !exists(destination).await? {
        return Ok(true);
    }
    if overwrite == OverwritePolicy::Always {
        return Ok(true);
    }

    let checksum = match checksum.filter(|c| !c.is_empty()) {
        Some(checksum) => checksum,
        None => return Ok(overwrite == OverwritePolicy::ChecksumNotMatchOrEmpty),
    };

    match verify_file(destination, checksum).await {
        Ok(()) => {
            debug!("{} is present and matches its checksum", destination.display());
            Ok(false)
        }
        Err(DownloadError::ChecksumMismatch { expected, actual, .. }) => {
            debug!("{} is present but digest {} != {}", destination.display(), actual, expected);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}
