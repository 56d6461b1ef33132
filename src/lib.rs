//! # Mailbox Archiver Library
//!
//! Archives a remote mailbox to local disk while staying inside the
//! provider's request quotas and riding out transient API failures.
//!
//! ## Features
//!
//! - **Request Pacing**: Minimum spacing between outbound calls ([`downloader::RateLimiter`])
//! - **Retry with Backoff**: Jittered exponential backoff for 429/500/503
//!   ([`downloader::RetryPolicy`])
//! - **Pagination**: Follows listing page tokens until the result set is exhausted
//! - **Safe Paths**: Byte-length-aware subject truncation that never splits a code point
//! - **Crash-Safe Status**: Progress snapshots replaced atomically for external monitors
//! - **Item-Scoped Failures**: One bad message never aborts the whole run
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailbox_archiver::downloader::{ArchiveConfig, Downloader};
//! use mailbox_archiver::fetcher::auth::StaticTokenProvider;
//! use mailbox_archiver::fetcher::gmail::GmailApi;
//! use mailbox_archiver::status::StatusReporter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ArchiveConfig::new("in:inbox", "./data/emails");
//! let tokens = Arc::new(StaticTokenProvider::new("ya29.token"));
//! let api = Arc::new(GmailApi::new(tokens)?);
//!
//! let mut downloader = Downloader::new(config, api)
//!     .with_status_reporter(StatusReporter::new("/tmp/mailbox-archiver-status.json"));
//! let report = downloader.run().await?;
//! println!("{} messages archived", report.stats.downloaded_emails);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`downloader`] - Run orchestration, pacing, retry policy and statistics
//! - [`fetcher`] - Remote API seam, retrying fetch client and the Gmail transport
//! - [`output`] - On-disk record layout and path sanitization
//! - [`status`] - Atomic status snapshots for external monitoring
//! - [`shutdown`] - Cancellation signal checked between items
//! - [`metrics`] - Prometheus counters mirroring the run statistics
//! - [`cli`] - Command-line surface

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Run orchestration
pub mod downloader;

/// Remote API access
pub mod fetcher;

/// Prometheus metrics
pub mod metrics;

/// On-disk record writers
pub mod output;

/// Cancellation coordination
pub mod shutdown;

/// Status file publishing
pub mod status;

/// Opaque message handle returned by listing.
///
/// Unique within the source mailbox. No ordering is implied across pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` characters, used in record directory names and log lines
    pub fn short(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Message body as delivered by the provider
///
/// Every decoded text part is kept, in MIME tree order, including parts
/// nested in forwarded `message/rfc822` containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// `text/plain` parts
    pub text: Vec<String>,
    /// `text/html` parts
    pub html: Vec<String>,
}

impl Body {
    /// Whether no text part is present
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.html.is_empty()
    }
}

/// Reference to an attachment belonging to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceRef {
    /// Provider attachment id (or MIME part id for inline data)
    pub id: String,
    /// Filename declared by the sender
    pub filename: String,
    /// Size declared by the provider, in bytes
    pub size: u64,
    /// Bytes embedded directly in the detail response; no fetch needed
    pub inline_data: Option<Vec<u8>>,
}

impl SubResourceRef {
    /// Reference to bytes that must be fetched separately
    pub fn remote(id: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            size,
            inline_data: None,
        }
    }

    /// Reference carrying its bytes inline
    pub fn inline(id: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            size: data.len() as u64,
            inline_data: Some(data),
        }
    }
}

/// Fully fetched message
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    /// Message id
    pub id: ItemId,
    /// Conversation id, if the provider groups messages
    pub thread_id: Option<String>,
    /// `Subject` header
    pub subject: String,
    /// `From` header
    pub sender: String,
    /// `To` header
    pub to: String,
    /// `Cc` header
    pub cc: String,
    /// Raw `Date` header as sent
    pub date_header: String,
    /// Parsed message timestamp
    pub timestamp: DateTime<Utc>,
    /// Provider labels (folders)
    pub labels: Vec<String>,
    /// Short preview text
    pub snippet: String,
    /// Body payload
    pub body: Body,
    /// Attachments
    pub sub_resources: Vec<SubResourceRef>,
}

impl ItemDetail {
    /// Minimal detail with only the fields needed to place a record on disk
    pub fn new(
        id: impl Into<ItemId>,
        subject: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
            subject: subject.into(),
            sender: String::new(),
            to: String::new(),
            cc: String::new(),
            date_header: String::new(),
            timestamp,
            labels: Vec::new(),
            snippet: String::new(),
            body: Body::default(),
            sub_resources: Vec::new(),
        }
    }
}
