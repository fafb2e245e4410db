//! Error types for the evaluation engine
//!
//! Each layer has its own error type so a fault is contained where it occurs:
//! sandbox faults become verification outcomes, provider faults become attempt
//! failures, and only source faults abort a run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Top-level error for operations that can abort a run or a command
#[derive(Error, Debug)]
pub enum EvalError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The task source failed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A provider call failed outside the retry wrapper
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// All retries of a provider call were exhausted
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// A grid failed validation
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Result log could not be written or read
    #[error("Checkpoint error at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker task failed to join
    #[error("Task join error: {0}")]
    Join(String),
}

impl EvalError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a checkpoint error for a path
    pub fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Checkpoint {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for EvalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

/// Grid validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("grid has no rows")]
    Empty,

    #[error("row {row} has length {found}, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("cell ({row}, {col}) is negative: {value}")]
    Negative { row: usize, col: usize, value: i64 },
}

/// Failures of the task source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task source {path}: {message}")]
    Format { path: PathBuf, message: String },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failures of a model provider call
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network or transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the endpoint
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No API key was configured
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
}

impl ProviderError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Terminal failure of the retry wrapper
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("call timed out after {timeout:?} ({attempts} attempts)")]
    Timeout { attempts: u32, timeout: Duration },

    #[error("call failed after {attempts} attempts: {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

impl InvokeError {
    /// Number of calls made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_error_attempts() {
        let err = InvokeError::Timeout {
            attempts: 3,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.attempts(), 3);

        let err = InvokeError::Failed {
            attempts: 2,
            source: ProviderError::protocol("empty choices"),
        };
        assert_eq!(err.attempts(), 2);
        assert!(err.to_string().contains("empty choices"));
    }

    #[test]
    fn test_eval_error_from_source() {
        let err: EvalError = SourceError::format("tasks.json", "expected array").into();
        assert!(matches!(err, EvalError::Source(_)));
        assert!(err.to_string().contains("expected array"));
    }
}
