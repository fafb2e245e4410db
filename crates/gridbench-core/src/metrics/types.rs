//! Record types written to the result log
//!
//! Durations are stored as fractional seconds so the log stays readable by
//! generic JSON tooling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::{Artifact, SolveMode};
use crate::llm::ChatMessage;
use crate::tasks::TaskDescriptor;

pub(crate) fn secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Classification of a verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    ExecutionError,
    OutputMismatch,
    /// The artifact or task could not be checked at all
    InvalidData,
}

/// One generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub attempt_index: u32,

    /// Raw model text, absent when the provider call failed
    #[serde(default)]
    pub raw_text: Option<String>,

    /// Free text preceding the artifact
    #[serde(default)]
    pub reasoning: Option<String>,

    /// Extracted code or answer grid
    #[serde(default)]
    pub artifact: Option<Artifact>,

    /// Why no artifact was produced
    #[serde(default)]
    pub error: Option<String>,

    pub latency_secs: f64,
}

impl GenerationAttempt {
    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Code artifact, if any
    pub fn code(&self) -> Option<&str> {
        match &self.artifact {
            Some(Artifact::Code(code)) => Some(code),
            _ => None,
        }
    }
}

/// Verification of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub attempt_index: u32,
    pub success: bool,
    pub kind: OutcomeKind,

    /// Human-readable reason, e.g. `OutputMismatch (Test Case 0)`
    pub reason: String,

    #[serde(default)]
    pub detail: Option<String>,

    pub latency_secs: f64,
}

impl VerificationOutcome {
    pub fn invalid_data(attempt_index: u32, reason: impl Into<String>) -> Self {
        Self {
            attempt_index,
            success: false,
            kind: OutcomeKind::InvalidData,
            reason: reason.into(),
            detail: None,
            latency_secs: 0.0,
        }
    }
}

/// Everything recorded for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub mode: SolveMode,

    /// Task as given, kept so the log can be re-verified offline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_data: Option<TaskDescriptor>,

    pub best_of: u32,

    #[serde(default)]
    pub prompt_messages: Vec<ChatMessage>,

    pub attempts: Vec<GenerationAttempt>,

    /// Parallel to `attempts`
    pub outcomes: Vec<VerificationOutcome>,

    pub total_latency_secs: f64,

    /// Fault that stopped the pipeline before it produced attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Synthetic record for a task whose pipeline faulted
    pub fn failed(task_id: impl Into<String>, fault: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            timestamp: Utc::now(),
            mode: SolveMode::default(),
            task_data: None,
            best_of: 0,
            prompt_messages: Vec::new(),
            attempts: Vec::new(),
            outcomes: Vec::new(),
            total_latency_secs: 0.0,
            error: Some(fault.into()),
        }
    }

    pub fn with_task(mut self, task: &TaskDescriptor, mode: SolveMode) -> Self {
        self.task_data = Some(task.clone());
        self.mode = mode;
        self
    }

    /// At least one attempt passed
    pub fn solved(&self) -> bool {
        self.outcomes.iter().any(|o| o.success)
    }

    /// The first attempt passed
    pub fn solved_first_attempt(&self) -> bool {
        self.outcomes.first().is_some_and(|o| o.success)
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    /// The task source failed part way
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Run-level summary, written once as the last log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub status: RunStatus,
    pub mode: SolveMode,
    pub model_identifier: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub total_runtime_secs: f64,

    pub best_of: u32,
    pub max_concurrent_tasks: usize,

    pub tasks_submitted: usize,
    pub tasks_completed: usize,
    pub tasks_solved: usize,

    pub generation_successful: usize,
    pub generation_failed: usize,
    pub verification_passed: usize,
    pub verification_failed_mismatch: usize,
    pub verification_failed_execution: usize,
    pub verification_failed_other: usize,

    /// Passed attempts over verified attempts
    pub verification_pass_rate_percent: f64,

    pub solved_task_ids: Vec<String>,
    pub unsolved_task_ids: Vec<String>,

    /// Why an aborted run stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Settings the run was started with
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One line of the result log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
pub enum LogEntry {
    Result(ResultRecord),
    Metadata(RunMetadata),
}
