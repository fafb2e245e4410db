//! Run state collector
//!
//! The coordinator owns one [`RunContext`]. Finished records are moved into it
//! as they arrive and the counters are updated in the same step, so the
//! metadata snapshot always matches the records collected so far.

use std::time::Instant;

use chrono::{DateTime, Utc};

use super::types::{OutcomeKind, ResultRecord, RunMetadata, RunStatus, secs};
use crate::executor::SolveMode;

/// Attempt-level tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub tasks_submitted: usize,
    pub generation_successful: usize,
    pub generation_failed: usize,
    pub verification_passed: usize,
    pub verification_failed_mismatch: usize,
    pub verification_failed_execution: usize,
    pub verification_failed_other: usize,
}

impl RunCounters {
    /// Tally the attempts of one record
    pub fn record(&mut self, record: &ResultRecord) {
        if record.attempts.is_empty() {
            // The pipeline faulted before any attempt was made
            self.generation_failed += record.best_of.max(1) as usize;
            return;
        }

        for (attempt, outcome) in record.attempts.iter().zip(&record.outcomes) {
            if !attempt.has_artifact() {
                self.generation_failed += 1;
                continue;
            }
            self.generation_successful += 1;
            match outcome.kind {
                OutcomeKind::Passed => self.verification_passed += 1,
                OutcomeKind::OutputMismatch => self.verification_failed_mismatch += 1,
                OutcomeKind::ExecutionError => self.verification_failed_execution += 1,
                OutcomeKind::InvalidData => self.verification_failed_other += 1,
            }
        }
    }

    pub fn verified(&self) -> usize {
        self.verification_passed
            + self.verification_failed_mismatch
            + self.verification_failed_execution
            + self.verification_failed_other
    }

    pub fn pass_rate_percent(&self) -> f64 {
        match self.verified() {
            0 => 0.0,
            n => (self.verification_passed as f64 / n as f64 * 10000.0).round() / 100.0,
        }
    }
}

/// Static facts about a run echoed into its metadata
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub mode: SolveMode,
    pub model_identifier: String,
    pub best_of: u32,
    pub max_concurrent_tasks: usize,
    pub config: serde_json::Value,
}

/// Results and counters of one run
#[derive(Debug)]
pub struct RunContext {
    info: RunInfo,
    results: Vec<ResultRecord>,
    counters: RunCounters,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl RunContext {
    pub fn new(info: RunInfo) -> Self {
        Self {
            info,
            results: Vec::new(),
            counters: RunCounters::default(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    /// A task was admitted
    pub fn submitted(&mut self) {
        self.counters.tasks_submitted += 1;
    }

    /// A task finished
    pub fn complete(&mut self, record: ResultRecord) {
        self.counters.record(&record);
        tracing::info!(
            task_id = %record.task_id,
            solved = record.solved(),
            completed = self.results.len() + 1,
            submitted = self.counters.tasks_submitted,
            "Task finished"
        );
        self.results.push(record);
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Metadata reflecting everything collected so far
    pub fn metadata(&self, status: RunStatus, error: Option<String>) -> RunMetadata {
        let (solved, unsolved): (Vec<&ResultRecord>, Vec<&ResultRecord>) =
            self.results.iter().partition(|r| r.solved());
        let finished_at = (status != RunStatus::Running).then(Utc::now);

        RunMetadata {
            status,
            mode: self.info.mode,
            model_identifier: self.info.model_identifier.clone(),
            started_at: self.started_at,
            finished_at,
            total_runtime_secs: secs(self.clock.elapsed()),
            best_of: self.info.best_of,
            max_concurrent_tasks: self.info.max_concurrent_tasks,
            tasks_submitted: self.counters.tasks_submitted,
            tasks_completed: self.results.len(),
            tasks_solved: solved.len(),
            generation_successful: self.counters.generation_successful,
            generation_failed: self.counters.generation_failed,
            verification_passed: self.counters.verification_passed,
            verification_failed_mismatch: self.counters.verification_failed_mismatch,
            verification_failed_execution: self.counters.verification_failed_execution,
            verification_failed_other: self.counters.verification_failed_other,
            verification_pass_rate_percent: self.counters.pass_rate_percent(),
            solved_task_ids: solved.iter().map(|r| r.task_id.clone()).collect(),
            unsolved_task_ids: unsolved.iter().map(|r| r.task_id.clone()).collect(),
            error,
            config: self.info.config.clone(),
        }
    }
}
