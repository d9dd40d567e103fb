//! Error types for quarry-index operations.

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while building, reading, or merging shards.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Reading or writing a shard file failed.
    #[error("shard I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A shard file does not conform to the expected format.
    #[error("malformed shard {path}: {message}")]
    Malformed {
        /// Path of the offending shard.
        path: String,
        /// Description of the format violation.
        message: String,
    },

    /// A single file was rejected by the builder and must not be indexed.
    ///
    /// The ingest pipeline reacts to this by removing the file and
    /// continuing with the rest of the package.
    #[error("file rejected: {reason}")]
    FileRejected {
        /// Why the file cannot be indexed.
        reason: String,
    },
}

impl IndexError {
    /// Creates a malformed-shard error for `path`.
    #[must_use]
    pub fn malformed(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Creates a per-file rejection error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::FileRejected {
            reason: reason.into(),
        }
    }
}
