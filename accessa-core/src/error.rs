//! Error types for the accessa-core library.
//!
//! Every fatal condition a job can hit maps onto a dedicated variant so the
//! scheduler logs can distinguish a probe failure (source left in place) from
//! a rule-table gap (needs a new profile rule) or an exhausted encode retry.

use std::process::ExitStatus;

use thiserror::Error;

/// Custom error types for accessa
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("External dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, #[source] std::io::Error),

    #[error("Command '{cmd}' failed ({status}): {stderr}")]
    CommandFailed {
        cmd: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to parse JSON output: {0}")]
    JsonParse(String),

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("No encode profile matched source: {0}")]
    ProfileUnresolved(String),

    #[error("Encode failed after retry: {0}")]
    EncodeFailed(String),

    #[error("Output failed conformance policy: {0}")]
    ValidationFailed(String),

    #[error("Still extraction failed: {0}")]
    StillExtractionFailed(String),

    #[error("Media record error: {0}")]
    Record(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    Path(String),
}

/// Result type for accessa operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Builds a `CommandStart` error for a command that failed to launch.
pub fn command_start_error(cmd: impl Into<String>, err: std::io::Error) -> CoreError {
    CoreError::CommandStart(cmd.into(), err)
}

/// Builds a `CommandFailed` error from a non-zero exit and captured stderr.
pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed {
        cmd: cmd.into(),
        status,
        stderr: stderr.into(),
    }
}
