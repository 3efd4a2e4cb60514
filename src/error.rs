//! Centralized error types for tagview.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the tagview library.
///
/// Charset decoding problems are deliberately absent: undecodable bytes are
/// replaced during decoding and never abort a render.
#[derive(Error, Debug)]
pub enum TagviewError {
    /// No message with this id exists in the index.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The thread query matched no messages.
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    /// The message exists but has no part at this ordinal.
    #[error("Message '{id}' has no part {ordinal}")]
    PartNotFound { id: String, ordinal: usize },

    /// The index could not be opened (missing, locked by another writer, ...).
    #[error("Mail index unavailable: {0}")]
    IndexUnavailable(String),

    /// The index rejected the query string.
    #[error("Malformed query '{query}': {reason}")]
    MalformedQuery { query: String, reason: String },

    /// A tag delta names a tag that cannot be stored (empty or blank).
    #[error("Invalid tag name: {0:?}")]
    InvalidTag(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The persisted header index is corrupt or from an incompatible version.
    #[error("Corrupt or incompatible index for '{path}': {reason}")]
    InvalidIndex { path: PathBuf, reason: String },

    /// The tag store could not be read or written.
    #[error("Tag store error: {0}")]
    TagStore(String),
}

/// Convenience alias for `Result<T, TagviewError>`.
pub type Result<T> = std::result::Result<T, TagviewError>;

impl TagviewError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `MalformedQuery` variant.
    pub fn malformed(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedQuery {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the errors a transport layer should report as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MessageNotFound(_) | Self::ThreadNotFound(_) | Self::PartNotFound { .. }
        )
    }

    /// `true` when retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_))
    }
}
