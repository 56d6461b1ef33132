//! Download configuration constants and the immutable run configuration

use std::path::PathBuf;
use std::time::Duration;

use super::DownloadError;

/// Default search query: every message, including spam and trash.
pub const DEFAULT_QUERY: &str = "in:anywhere";

/// Default outbound request ceiling.
/// Gmail allows 250 quota units per user per second; a `messages.get` costs 5,
/// so 10 calls per second leaves generous headroom.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Requests per second above which a warning is emitted (provider hard limit).
pub const MAX_SANE_REQUESTS_PER_SECOND: f64 = 250.0;

/// Maximum number of retries for retryable failures (429/500/503).
/// Initial attempt plus 5 retries; worst-case wait is ~63s before giving up.
pub const MAX_RETRIES: u32 = 5;

/// Base backoff delay in milliseconds (attempt 0).
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Consecutive items failing on disk I/O before the run is aborted.
pub const MAX_CONSECUTIVE_IO_FAILURES: u32 = 10;

/// Byte cap for the subject portion of a record directory name.
pub const SUBJECT_MAX_BYTES: usize = 50;

/// Number of id characters appended to a record directory name.
pub const SHORT_ID_LEN: usize = 8;

/// Page size requested from the listing endpoint (provider maximum).
pub const LIST_PAGE_SIZE: u32 = 500;

/// Immutable configuration threaded through the fetch pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    /// Provider search query, forwarded verbatim
    pub query: String,
    /// Root of the record tree
    pub output_dir: PathBuf,
    /// Outbound call ceiling; `<= 0` disables pacing
    pub requests_per_second: f64,
    /// Retries per call for retryable failures
    pub max_retries: u32,
    /// Backoff delay for the first retry
    pub base_retry_delay: Duration,
    /// Stop after this many items (`None` = unlimited)
    pub max_results: Option<u64>,
    /// Fetch and store attachments
    pub include_attachments: bool,
    /// Delete each message remotely once it is fully archived
    pub delete_after_download: bool,
    /// Consecutive disk failures tolerated before aborting (`0` = never abort)
    pub max_consecutive_io_failures: u32,
}

impl ArchiveConfig {
    /// Configuration with defaults for everything but query and output root
    pub fn new(query: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            query: query.into(),
            output_dir: output_dir.into(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_retries: MAX_RETRIES,
            base_retry_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_results: None,
            include_attachments: true,
            delete_after_download: false,
            max_consecutive_io_failures: MAX_CONSECUTIVE_IO_FAILURES,
        }
    }

    /// Set the request ceiling
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set retries per call
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first-retry backoff
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    /// Cap the number of items processed
    pub fn with_max_results(mut self, max_results: Option<u64>) -> Self {
        self.max_results = max_results;
        self
    }

    /// Enable or disable attachment download
    pub fn with_attachments(mut self, include: bool) -> Self {
        self.include_attachments = include;
        self
    }

    /// Enable or disable remote deletion after archiving
    pub fn with_delete_after_download(mut self, delete: bool) -> Self {
        self.delete_after_download = delete;
        self
    }

    /// Set the consecutive disk failure threshold
    pub fn with_max_consecutive_io_failures(mut self, threshold: u32) -> Self {
        self.max_consecutive_io_failures = threshold;
        self
    }

    /// Check the configuration.
    ///
    /// Returns non-fatal warnings on success; hard errors as [`DownloadError::ValidationError`].
    pub fn validate(&self) -> Result<Vec<String>, DownloadError> {
        let mut warnings = Vec::new();

        if self.requests_per_second.is_nan() || self.requests_per_second < 0.0 {
            return Err(DownloadError::ValidationError(format!(
                "requests per second must be >= 0 (0 disables pacing), got {}",
                self.requests_per_second
            )));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(DownloadError::ValidationError(
                "output directory cannot be empty".to_string(),
            ));
        }

        if self.max_results == Some(0) {
            return Err(DownloadError::ValidationError(
                "max results must be at least 1 when set".to_string(),
            ));
        }

        if self.requests_per_second > MAX_SANE_REQUESTS_PER_SECOND {
            warnings.push(format!(
                "requests per second {} exceeds the provider limit of {}; expect 429 responses",
                self.requests_per_second, MAX_SANE_REQUESTS_PER_SECOND
            ));
        }

        if self.delete_after_download {
            warnings.push(
                "delete after download is enabled; \
                 messages are removed from the server once archived"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}
