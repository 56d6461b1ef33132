//! Writer for a single archived message
//!
//! A record directory holds `metadata.json`, one file per body part
//! (`body.txt`, `body_1.txt`, ..., `body.html`, `body_1.html`, ...), and an
//! `attachments/` subdirectory created on first use. Files are
//! overwritten in place so re-running over the same mailbox is idempotent.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::path::{sanitize_filename, split_extension, ATTACHMENT_NAME_MAX_BYTES};
use super::{io_error, OutputError, OutputResult};
use crate::{Body, ItemDetail};

/// Metadata file name
pub const METADATA_FILE: &str = "metadata.json";
/// Plain-text body file name
pub const BODY_TEXT_FILE: &str = "body.txt";
/// HTML body file name
pub const BODY_HTML_FILE: &str = "body.html";
/// Attachment subdirectory name
pub const ATTACHMENTS_DIR: &str = "attachments";

#[derive(Serialize)]
struct RecordMetadata<'a> {
    id: &'a str,
    thread_id: Option<&'a str>,
    subject: &'a str,
    from: &'a str,
    to: &'a str,
    cc: &'a str,
    date: &'a str,
    timestamp: String,
    labels: &'a [String],
    snippet: &'a str,
    attachments: Vec<AttachmentSummary<'a>>,
}

#[derive(Serialize)]
struct AttachmentSummary<'a> {
    filename: &'a str,
    size: u64,
}

/// Writes the files of one record and tallies bytes written
#[derive(Debug)]
pub struct RecordWriter {
    dir: PathBuf,
    bytes_written: u64,
    used_names: HashSet<String>,
}

impl RecordWriter {
    /// Create (or reuse) the record directory
    ///
    /// # Errors
    /// Returns `OutputError::IoError` if the directory cannot be created
    pub fn create(dir: impl Into<PathBuf>) -> OutputResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;
        Ok(Self {
            dir,
            bytes_written: 0,
            used_names: HashSet::new(),
        })
    }

    /// Record directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Total bytes written through this writer
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write `metadata.json`
    pub fn write_metadata(&mut self, detail: &ItemDetail) -> OutputResult<()> {
        let metadata = RecordMetadata {
            id: detail.id.as_str(),
            thread_id: detail.thread_id.as_deref(),
            subject: &detail.subject,
            from: &detail.sender,
            to: &detail.to,
            cc: &detail.cc,
            date: &detail.date_header,
            timestamp: detail.timestamp.to_rfc3339(),
            labels: &detail.labels,
            snippet: &detail.snippet,
            attachments: detail
                .sub_resources
                .iter()
                .map(|s| AttachmentSummary {
                    filename: &s.filename,
                    size: s.size,
                })
                .collect(),
        };

        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| OutputError::SerializationError(format!("metadata: {e}")))?;
        self.write_file(self.dir.join(METADATA_FILE), &json)
    }

    /// Write every body part; the first of each kind keeps the plain name
    pub fn write_body(&mut self, body: &Body) -> OutputResult<()> {
        for (index, text) in body.text.iter().enumerate() {
            let path = self.dir.join(body_file_name(BODY_TEXT_FILE, index));
            self.write_file(path, text.as_bytes())?;
        }
        for (index, html) in body.html.iter().enumerate() {
            let path = self.dir.join(body_file_name(BODY_HTML_FILE, index));
            self.write_file(path, html.as_bytes())?;
        }
        Ok(())
    }

    /// Write one attachment under `attachments/`, returning its path
    ///
    /// The name is sanitized; a name already used in this record gets a
    /// `_1`, `_2`, ... suffix before the extension.
    pub fn write_attachment(&mut self, filename: &str, data: &[u8]) -> OutputResult<PathBuf> {
        let dir = self.dir.join(ATTACHMENTS_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;

        let name = self.unique_name(&sanitize_filename(filename, ATTACHMENT_NAME_MAX_BYTES));
        let path = dir.join(&name);
        self.write_file(path.clone(), data)?;
        self.used_names.insert(name);
        Ok(path)
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.used_names.contains(name) {
            return name.to_string();
        }
        let (stem, ext) = split_extension(name);
        (1u32..)
            .map(|n| format!("{stem}_{n}{ext}"))
            .find(|candidate| !self.used_names.contains(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    fn write_file(&mut self, path: PathBuf, data: &[u8]) -> OutputResult<()> {
        fs::write(&path, data).map_err(|e| io_error("write", &path, e))?;
        self.bytes_written = self.bytes_written.saturating_add(data.len() as u64);
        Ok(())
    }
}

/// `body.txt` for index 0, then `body_1.txt`, `body_2.txt`, ...
pub fn body_file_name(base: &str, index: usize) -> String {
    if index == 0 {
        return base.to_string();
    }
    let (stem, ext) = split_extension(base);
    format!("{stem}_{index}{ext}")
}
