//! Configuration types for the downloader system

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Configuration for the default network-backed downloader
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Whole-request timeout used when a request does not set its own
    pub timeout: Duration,
    pub user_agent: String,
    /// Maximum redirects followed per request
    pub max_redirects: usize,
    /// How long idle keep-alive connections stay pooled
    pub pool_idle_timeout: Duration,
    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Chunk size used when streaming local files
    pub buffer_size: usize,
    /// Verify the written file against the request checksum before it
    /// replaces the destination
    pub verify_after_download: bool,
    /// Initial delay between retries of one candidate (doubles each retry)
    pub retry_delay: Duration,
    /// Maximum retry delay cap
    pub max_retry_delay: Duration,
}

impl DownloadConfig {
    /// Calculate retry delay for the given attempt using exponential backoff
    pub fn get_retry_delay(&self, attempt: usize) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(32) as u32);
        let delay = (self.retry_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay.as_millis() as u64))
    }

    /// Defaults overridden by `INSTALLER_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    /// Recognized variables: `INSTALLER_TIMEOUT_SECS`,
    /// `INSTALLER_CONNECT_TIMEOUT_SECS`, `INSTALLER_USER_AGENT`,
    /// `INSTALLER_MAX_REDIRECTS`, `INSTALLER_BUFFER_SIZE`,
    /// `INSTALLER_VERIFY_AFTER_DOWNLOAD`, `INSTALLER_RETRY_DELAY_MS`,
    /// `INSTALLER_MAX_RETRY_DELAY_MS`. Unparseable values are ignored with a
    /// warning.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Some(secs) = env_value::<u64>("INSTALLER_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_value::<u64>("INSTALLER_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Ok(user_agent) = std::env::var("INSTALLER_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(redirects) = env_value("INSTALLER_MAX_REDIRECTS") {
            config.max_redirects = redirects;
        }
        if let Some(size) = env_value::<usize>("INSTALLER_BUFFER_SIZE") {
            config.buffer_size = size.max(1);
        }
        if let Some(verify) = env_value("INSTALLER_VERIFY_AFTER_DOWNLOAD") {
            config.verify_after_download = verify;
        }
        if let Some(ms) = env_value::<u64>("INSTALLER_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("INSTALLER_MAX_RETRY_DELAY_MS") {
            config.max_retry_delay = Duration::from_millis(ms);
        }
        config
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            user_agent: concat!("asset-installer/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 16,
            buffer_size: 64 * 1024,
            verify_after_download: true,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

/// Builder for [`DownloadConfig`]
#[derive(Debug, Clone, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.max(1);
        self
    }

    pub fn verify_after_download(mut self, verify: bool) -> Self {
        self.config.verify_after_download = verify;
        self
    }

    pub fn retry_delay(mut self, delay: Duration, max_delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self.config.max_retry_delay = max_delay;
        self
    }

    /// Zero backoff, for tests and local mirrors
    pub fn no_backoff(self) -> Self {
        self.retry_delay(Duration::ZERO, Duration::ZERO)
    }

    pub fn build(self) -> DownloadConfig {
        self.config
    }
}
