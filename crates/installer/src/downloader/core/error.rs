//! Error types for the download core with context and recovery information

use std::error::Error as _;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while fetching, writing or verifying a single asset
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transport-level HTTP failure (connection reset, TLS, broken body stream)
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code
    #[error("HTTP request to '{url}' returned status {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    /// No response within the configured request timeout
    #[error("Timed out after {duration_secs}s waiting for '{url}'")]
    NetworkTimeout {
        url: String,
        duration_secs: u64,
    },

    /// Local I/O failure on a destination or source file
    #[error("Could not {operation} '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// Candidate string is not a parseable URL
    #[error("Malformed URL '{url}' ({suggestion})")]
    InvalidUrl {
        url: String,
        suggestion: String,
        #[source]
        source: url::ParseError,
    },

    /// URL scheme that no stream source can open
    #[error("Cannot open '{url}': scheme '{scheme}' is not one of {supported_schemes}")]
    UnsupportedUrl {
        url: String,
        scheme: String,
        supported_schemes: String,
    },

    /// Digest algorithm name that cannot be computed
    #[error("Unsupported checksum algorithm '{algorithm}'")]
    UnsupportedAlgorithm {
        algorithm: String,
    },

    /// Written file does not match the expected digest
    #[error("Checksum mismatch for '{file}': expected {algorithm} {expected}, got {actual}")]
    ChecksumMismatch {
        file: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// Response body could not be decoded
    #[error("Could not decode response from '{url}'")]
    InvalidContent {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Request was built without any candidate URL
    #[error("Download request for '{destination}' has no candidate URLs")]
    NoCandidates {
        destination: PathBuf,
    },

    /// Downloader could not be built from its configuration
    #[error("Bad downloader configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// A progress sink asked the transfer to stop
    #[error("Download cancelled")]
    Cancelled,
}

/// What was being done to a file when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    CreateDir,
    Rename,
    Metadata,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Create => "create",
            FileOperation::CreateDir => "create directories for",
            FileOperation::Rename => "move into place",
            FileOperation::Metadata => "inspect",
        })
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Build a file system error for `path`
    pub fn fs<P: Into<PathBuf>>(path: P, operation: FileOperation, source: std::io::Error) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    /// Whether the same candidate URL is worth another attempt
    pub fn is_recoverable(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            DownloadError::HttpRequest { source, .. } => match source.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => true,
            },
            DownloadError::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            DownloadError::NetworkTimeout { .. } => true,
            DownloadError::FileSystem { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether the mirror chain must stop instead of trying the next candidate
    pub fn aborts_fallback(&self) -> bool {
        matches!(self, DownloadError::Cancelled | DownloadError::UnsupportedAlgorithm { .. })
    }

    /// Stable snake_case name used as a log field
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::HttpRequest { .. } => "http_request",
            DownloadError::HttpStatus { .. } => "http_status",
            DownloadError::NetworkTimeout { .. } => "timeout",
            DownloadError::FileSystem { .. } => "io",
            DownloadError::InvalidUrl { .. } => "invalid_url",
            DownloadError::UnsupportedUrl { .. } => "unsupported_scheme",
            DownloadError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            DownloadError::ChecksumMismatch { .. } => "checksum_mismatch",
            DownloadError::InvalidContent { .. } => "invalid_content",
            DownloadError::NoCandidates { .. } => "no_candidates",
            DownloadError::Configuration { .. } => "config",
            DownloadError::Cancelled => "cancelled",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DownloadError::Cancelled => ErrorSeverity::Low,
            DownloadError::HttpRequest { .. }
            | DownloadError::HttpStatus { .. }
            | DownloadError::NetworkTimeout { .. }
            | DownloadError::InvalidContent { .. } => ErrorSeverity::Medium,
            DownloadError::Configuration { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Hint for the person running the installer
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            DownloadError::NetworkTimeout { .. } => Some("Raise INSTALLER_TIMEOUT_SECS or check the connection"),
            DownloadError::InvalidUrl { suggestion, .. } => Some(suggestion),
            DownloadError::UnsupportedUrl { .. } => Some("Use a file, http or https URL"),
            DownloadError::UnsupportedAlgorithm { .. } => Some("Use one of sha1, sha256, sha512, md5 or xxh64"),
            DownloadError::ChecksumMismatch { .. } => Some("The mirror served different content; try another mirror"),
            DownloadError::HttpStatus { status: 404, .. } => Some("The asset is missing on this mirror"),
            _ => None,
        }
    }

    /// Multi-line description with category, severity, hint and cause
    pub fn detailed_report(&self) -> String {
        let mut lines = vec![
            format!("error: {}", self),
            format!("category: {}", self.category()),
            format!("severity: {:?}", self.severity()),
            format!("recoverable: {}", self.is_recoverable()),
        ];
        if let Some(hint) = self.suggestion() {
            lines.push(format!("hint: {}", hint));
        }
        let mut cause = self.source();
        while let Some(inner) = cause {
            lines.push(format!("caused by: {}", inner));
            cause = inner.source();
        }
        lines.join("\n")
    }

    /// Map a reqwest error for `url`, keeping timeouts distinct
    pub(crate) fn from_reqwest(url: &str, error: reqwest::Error, timeout_secs: u64) -> Self {
        let url = url.to_string();
        match error.is_timeout() {
            true => DownloadError::NetworkTimeout { url, duration_secs: timeout_secs },
            false => DownloadError::HttpRequest { url, source: error },
        }
    }

    pub(crate) fn invalid_url(url: &str, error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::RelativeUrlWithoutBase => "candidate URLs must be absolute",
            url::ParseError::EmptyHost => "the host name is empty",
            url::ParseError::InvalidPort => "the port is out of range",
            url::ParseError::InvalidIpv4Address | url::ParseError::InvalidIpv6Address => {
                "the IP address is malformed"
            }
            _ => "check the mirror list entry",
        };

        DownloadError::InvalidUrl {
            url: url.to_string(),
            suggestion: suggestion.to_string(),
            source: error,
        }
    }
}

/// How bad a failure is for the surrounding install
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}
