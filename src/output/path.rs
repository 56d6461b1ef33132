//! Hierarchical path generation for archived messages
//!
//! Records are laid out as
//! `{root}/{YYYY}/{MM}/{DD}/{HHMMSS}_{subject}_{id8}/`, all in UTC.
//!
//! Filesystems limit a single name to 255 *bytes*, not characters, so every
//! length cap here counts encoded UTF-8 bytes and cuts only at char
//! boundaries.
//!
//! # Usage Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use mailbox_archiver::output::RecordPathBuilder;
//! use mailbox_archiver::ItemDetail;
//!
//! let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
//! let detail = ItemDetail::new("18c2f3a9b7d41e05", "Re: lunch?", ts);
//!
//! let path = RecordPathBuilder::new("data").build(&detail);
//! assert!(path.ends_with("2024/03/09/140507_Re_ lunch__18c2f3a9"));
//! ```

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::downloader::config::{SHORT_ID_LEN, SUBJECT_MAX_BYTES};
use crate::ItemDetail;

/// Filesystem limit for a single path component, in bytes
pub const MAX_NAME_BYTES: usize = 255;

/// Byte cap for attachment filenames
pub const ATTACHMENT_NAME_MAX_BYTES: usize = 200;

/// Stand-in for subjects that sanitize to nothing
pub const UNNAMED_SUBJECT: &str = "unnamed";

/// Stand-in for attachment names that sanitize to nothing
pub const UNNAMED_ATTACHMENT: &str = "attachment";

// Longer "extensions" are treated as part of the stem.
const MAX_EXTENSION_BYTES: usize = 16;

/// Builds record directory paths under an output root
#[derive(Debug, Clone)]
pub struct RecordPathBuilder {
    root_dir: PathBuf,
}

impl RecordPathBuilder {
    /// Create a builder rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Output root
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// `{root}/{YYYY}/{MM}/{DD}` for the given instant
    pub fn date_dir(&self, timestamp: &DateTime<Utc>) -> PathBuf {
        self.root_dir
            .join(timestamp.format("%Y").to_string())
            .join(timestamp.format("%m").to_string())
            .join(timestamp.format("%d").to_string())
    }

    /// Full record directory for `detail`
    pub fn build(&self, detail: &ItemDetail) -> PathBuf {
        self.date_dir(&detail.timestamp)
            .join(record_dir_name(detail))
    }
}

/// `{HHMMSS}_{subject}_{id8}`, never longer than [`MAX_NAME_BYTES`]
pub fn record_dir_name(detail: &ItemDetail) -> String {
    let subject = sanitize_subject(&detail.subject, SUBJECT_MAX_BYTES);
    let short_id: String = detail
        .id
        .short(SHORT_ID_LEN)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    let name = format!(
        "{}_{}_{}",
        detail.timestamp.format("%H%M%S"),
        subject,
        short_id
    );
    truncate_to_byte_boundary(&name, MAX_NAME_BYTES).to_string()
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char
pub fn truncate_to_byte_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

fn replace_forbidden(s: &str) -> String {
    s.chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect()
}

fn trim_dots_and_spaces(s: &str) -> &str {
    s.trim_matches(|c| c == '.' || c == ' ')
}

/// Make a subject safe for use inside a directory name
///
/// Unsafe characters become `_`, leading and trailing dots and spaces are
/// removed, and the result is capped at `max_bytes`. Applying it twice
/// yields the same string.
pub fn sanitize_subject(subject: &str, max_bytes: usize) -> String {
    let replaced = replace_forbidden(subject);
    let trimmed = trim_dots_and_spaces(&replaced);
    let truncated = truncate_to_byte_boundary(trimmed, max_bytes);
    let result = truncated.trim_end_matches(|c| c == '.' || c == ' ');

    if result.is_empty() {
        UNNAMED_SUBJECT.to_string()
    } else {
        result.to_string()
    }
}

/// Make a sender-supplied attachment name safe, keeping its extension
pub fn sanitize_filename(name: &str, max_bytes: usize) -> String {
    let replaced = replace_forbidden(name);
    let trimmed = trim_dots_and_spaces(&replaced);
    if trimmed.is_empty() {
        return UNNAMED_ATTACHMENT.to_string();
    }
    if trimmed.len() <= max_bytes {
        return trimmed.to_string();
    }

    let (stem, ext) = split_extension(trimmed);
    let stem_budget = max_bytes.saturating_sub(ext.len());
    let stem =
        truncate_to_byte_boundary(stem, stem_budget).trim_end_matches(|c| c == '.' || c == ' ');
    if stem.is_empty() {
        return truncate_to_byte_boundary(trimmed, max_bytes).to_string();
    }
    format!("{stem}{ext}")
}

/// Split `report.final.pdf` into (`report.final`, `.pdf`)
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= MAX_EXTENSION_BYTES => name.split_at(idx),
        _ => (name, ""),
    }
}
