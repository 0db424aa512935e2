//! Error taxonomy for the execution step.

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced while acquiring, running or reporting on the cleanup tool.
///
/// None of these cross the invocation boundary: the orchestrator folds every
/// variant into a `ResultEnvelope`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("no working {tool} binary found in archive ({examined} members examined)")]
    BinaryNotFound { tool: String, examined: usize },

    #[error("execution timed out after {} seconds", secs(.limit))]
    ProcessTimeout { limit: Duration },

    #[error("cleanup tool exited with code {code}")]
    ProcessFailure { code: i32 },

    #[error("failed to persist {uri}: {reason}")]
    PersistenceFailure { uri: String, reason: String },

    #[error("version probe failed for {}: {reason}", .path.display())]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("release registry lookup failed: {0}")]
    Registry(String),

    #[error("policy document unavailable: {0}")]
    PolicyUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        ExecutorError::Http(err.to_string())
    }
}

/// Seconds rendering used in user-facing messages (`870`, `0.5`).
pub(crate) fn secs(d: &Duration) -> String {
    let s = d.as_secs_f64();
    if s.fract() == 0.0 {
        format!("{}", d.as_secs())
    } else {
        format!("{s}")
    }
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;
