//! Error types and result aliases shared across quarry components.

/// The result type used throughout quarry-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external tool could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Name of the tool that failed to start.
        program: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An external tool ran but exited unsuccessfully.
    #[error("{program} exited with {status}")]
    ToolFailed {
        /// Name of the tool that failed.
        program: String,
        /// The exit status reported by the operating system.
        status: std::process::ExitStatus,
    },
}
