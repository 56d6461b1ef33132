//! Run orchestration, pacing and retry policy
//!
//! # Overview
//!
//! A run moves through `Listing → Processing(item) → Draining → Finished`:
//!
//! 1. **Listing**: every page of ids matching the query is collected
//! 2. **Processing**: each id is fetched and written as a record on disk
//! 3. **Draining**: the final statistics are published
//! 4. **Finished**: the run ends as `complete`, `error` or `cancelled`
//!
//! Outbound calls go through [`crate::fetcher::FetchClient`], which applies
//! the [`RateLimiter`] and [`RetryPolicy`] defined here.
//!
//! # Error Handling
//!
//! Failures scoped to one item (not found, exhausted retries, a bad
//! attachment, a disk error) are counted and the run moves on. Listing
//! failures, expired authorization and a streak of disk failures end the
//! run with the `error` state.
//!
//! # Components
//!
//! - [`executor`] - The [`Downloader`] state machine
//! - [`config`] - [`ArchiveConfig`] and default constants
//! - [`rate_limit`] - Minimum-interval request pacing
//! - [`retry`] - Jittered exponential backoff decisions
//! - [`stats`] - Run counters and progress lines

pub mod config;
pub mod executor;
pub mod rate_limit;
pub mod retry;
pub mod stats;

pub use config::ArchiveConfig;
pub use executor::{Downloader, RunReport};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::{ProgressLog, RunStatistics};

use crate::fetcher::FetcherError;
use crate::output::OutputError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Remote call failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetcherError),

    /// Writing a record failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Too many items in a row failed on disk
    #[error("{count} consecutive items failed to write; aborting")]
    RepeatedIoFailure {
        /// Length of the failure streak
        count: u32,
    },

    /// Configuration rejected before the run started
    #[error("validation error: {0}")]
    ValidationError(String),

    /// IO error outside record writing
    #[error("IO error: {0}")]
    IoError(String),
}
