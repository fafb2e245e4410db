//! Execution of untrusted generated code
//!
//! A [`CodeRunner`] loads model-produced source, calls its entry point on a
//! grid and returns the grid it produced. Every fault is reported as a
//! [`SandboxError`]; runners never panic on bad code.

mod python;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Grid;

pub use python::PythonSandbox;

/// Kind of sandbox failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxErrorKind {
    /// The source failed to compile
    Syntax,
    /// The entry point is absent or not callable
    MissingEntryPoint,
    /// Loading or calling the code raised
    Runtime,
    /// The return value is not a valid grid
    InvalidOutputShape,
    /// The call exceeded its wall-clock limit
    Timeout,
}

impl SandboxErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "Syntax Error",
            Self::MissingEntryPoint => "Missing Entry Point",
            Self::Runtime => "Runtime Error",
            Self::InvalidOutputShape => "Output Error",
            Self::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for SandboxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sandbox failure with human-readable detail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct SandboxError {
    pub kind: SandboxErrorKind,
    pub detail: String,
}

impl SandboxError {
    pub fn new(kind: SandboxErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn syntax(detail: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Syntax, detail)
    }

    pub fn missing_entry_point(detail: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::MissingEntryPoint, detail)
    }

    pub fn runtime(detail: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Runtime, detail)
    }

    pub fn invalid_output(detail: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::InvalidOutputShape, detail)
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            SandboxErrorKind::Timeout,
            format!("execution exceeded {:?}", limit),
        )
    }
}

/// Runs generated code against a single input grid
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Execute `code` in a fresh context and call its entry point on `input`.
    ///
    /// `attempt_id` only names the execution context; it carries no state
    /// between calls.
    async fn run(&self, code: &str, input: &Grid, attempt_id: &str) -> Result<Grid, SandboxError>;
}
