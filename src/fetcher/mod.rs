//! Remote API access
//!
//! [`MailApi`] is the transport seam: one raw call per method, no pacing and
//! no retries. [`client::FetchClient`] wraps any implementation with the rate
//! limiter and retry policy. [`gmail::GmailApi`] is the production transport.

use async_trait::async_trait;

use crate::{ItemDetail, ItemId};

pub mod auth;
pub mod client;
pub mod gmail;
pub mod gmail_parser;
pub mod retry_formatter;

pub use client::{CallReport, FetchClient, FetchFailure, Fetched};

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    /// HTTP 429, quota exhausted
    #[error("rate limit exceeded")]
    RateLimited,

    /// HTTP 500 or 503
    #[error("transient server error: HTTP {0}")]
    TransientServer(u16),

    /// The resource no longer exists (usually deleted server-side)
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP 401; the bearer credential is no longer accepted
    #[error("authorization expired: {0}")]
    AuthExpired(String),

    /// Other 4xx
    #[error("client error {status}: {message}")]
    ClientError {
        /// HTTP status
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Other 5xx
    #[error("server error: HTTP {0}")]
    ServerError(u16),

    /// Transport failure before a response was received
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    ParseError(String),
}

impl FetcherError {
    /// Whether the retry policy may try the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::TransientServer(_))
    }

    /// Whether this is a quota rejection
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Whether the whole run must stop
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    /// Map an HTTP error status onto the taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthExpired(message),
            404 | 410 => Self::NotFound(message),
            429 => Self::RateLimited,
            500 | 503 => Self::TransientServer(status),
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError { status, message },
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One page of listing results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Item ids on this page
    pub ids: Vec<ItemId>,
    /// Token for the next page; absent on the last page
    pub next_page_token: Option<String>,
    /// Provider's estimate of the total result size
    pub result_size_estimate: Option<u64>,
}

/// Raw message-store operations
///
/// Implementations perform exactly one request per call and map failures
/// onto [`FetcherError`]. Pacing and retries belong to [`FetchClient`].
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Fetch one page of ids matching `query`
    async fn list_page(&self, query: &str, page_token: Option<&str>) -> FetcherResult<ListPage>;

    /// Fetch the full detail of one item
    async fn get_detail(&self, id: &ItemId) -> FetcherResult<ItemDetail>;

    /// Fetch the bytes of one attachment
    async fn get_sub_resource(&self, item_id: &ItemId, sub_id: &str) -> FetcherResult<Vec<u8>>;

    /// Permanently delete one item
    async fn delete_item(&self, id: &ItemId) -> FetcherResult<()>;
}
