//! On-disk record layout
//!
//! - [`path`] - Sanitization and the `YYYY/MM/DD/HHMMSS_subject_id` layout
//! - [`record`] - Writes one message's metadata, body and attachments

pub mod path;
pub mod record;

pub use path::{sanitize_filename, sanitize_subject, truncate_to_byte_boundary, RecordPathBuilder};
pub use record::RecordWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Filesystem error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl OutputError {
    /// Whether the failure came from the filesystem
    pub fn is_io(&self) -> bool {
        matches!(self, Self::IoError(_))
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

pub(crate) fn io_error(action: &str, path: &std::path::Path, err: std::io::Error) -> OutputError {
    OutputError::IoError(format!("Failed to {} {}: {}", action, path.display(), err))
}
