//! Verification of generated code against a task's test cases
//!
//! The verifier runs the code on each test input in order and stops at the
//! first failure. There is no partial credit: one failing case fails the
//! whole verification.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grid::grids_equal;
use crate::sandbox::{CodeRunner, SandboxError};
use crate::tasks::TaskDescriptor;

/// Why a verification passed or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "test_case", rename_all = "snake_case")]
pub enum VerifyReason {
    Passed,
    ExecutionError(usize),
    OutputMismatch(usize),
    MissingTestCases,
}

impl fmt::Display for VerifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "Passed"),
            Self::ExecutionError(i) => write!(f, "ExecutionError (Test Case {})", i),
            Self::OutputMismatch(i) => write!(f, "OutputMismatch (Test Case {})", i),
            Self::MissingTestCases => write!(f, "MissingTestCases"),
        }
    }
}

/// Outcome of verifying one piece of code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub success: bool,
    pub reason: VerifyReason,
    /// Sandbox error text for execution failures
    pub detail: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            success: true,
            reason: VerifyReason::Passed,
            detail: None,
        }
    }

    fn fail(reason: VerifyReason) -> Self {
        Self {
            success: false,
            reason,
            detail: None,
        }
    }

    fn with_details(mut self, error: &SandboxError) -> Self {
        self.detail = Some(error.to_string());
        self
    }
}

/// Runs code against every test case of a task
pub struct Verifier {
    runner: Arc<dyn CodeRunner>,
}

impl Verifier {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self { runner }
    }

    /// Verify `code` against `task.test_cases`, failing fast
    pub async fn verify(&self, code: &str, task: &TaskDescriptor) -> Verdict {
        if task.test_cases.is_empty() {
            tracing::warn!(task_id = %task.task_id, "Task has no test cases");
            return Verdict::fail(VerifyReason::MissingTestCases);
        }

        for (index, case) in task.test_cases.iter().enumerate() {
            let attempt_id = format!("{}_{}", task.task_id, index);
            match self.runner.run(code, &case.input, &attempt_id).await {
                Err(error) => {
                    tracing::debug!(
                        task_id = %task.task_id,
                        test_case = index,
                        "Execution failed: {}",
                        error
                    );
                    return Verdict::fail(VerifyReason::ExecutionError(index)).with_details(&error);
                }
                Ok(actual) if !grids_equal(actual.rows(), case.output.rows()) => {
                    tracing::debug!(task_id = %task.task_id, test_case = index, "Output mismatch");
                    return Verdict::fail(VerifyReason::OutputMismatch(index));
                }
                Ok(_) => {}
            }
        }

        Verdict::pass()
    }
}
