//! Importer error types and HTTP response mapping.
//!
//! The importer serves a legacy plain-text surface: every pipeline failure
//! is reported to clients as a 500 with a human-readable body, matching
//! what upload agents and operator tooling already expect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for importer operations.
pub type Result<T> = std::result::Result<T, ImporterError>;

/// Errors that can occur in the ingest pipeline and its HTTP surface.
#[derive(Debug, Error)]
pub enum ImporterError {
    /// Filesystem failure in the staging area or canonical store.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// An extraction tool failed.
    #[error(transparent)]
    Extract(#[from] quarry_core::Error),

    /// The index library failed.
    #[error(transparent)]
    Index(#[from] quarry_index::IndexError),

    /// The index backend rejected or failed an RPC.
    #[error("index backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A request parameter was malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// A required request parameter was absent.
    #[error("no ?{name}= provided")]
    MissingParameter {
        /// Name of the absent parameter.
        name: &'static str,
    },

    /// Garbage collection was asked for a package the store does not hold.
    #[error("no such package: {0}")]
    UnknownPackage(String),

    /// A merge is already running.
    #[error("Merge already in progress, please try again later.")]
    MergeInProgress,
}

impl ImporterError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a storage error describing an I/O failure on `context`.
    #[must_use]
    pub fn storage_io(context: impl std::fmt::Display, source: &std::io::Error) -> Self {
        Self::Storage {
            message: format!("{context}: {source}"),
        }
    }

    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates an invalid-request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

}

impl IntoResponse for ImporterError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{self}\n")).into_response()
    }
}
