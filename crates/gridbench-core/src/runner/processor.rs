//! Best-of-N pipeline for a single task
//!
//! Each attempt asks the provider through the retry wrapper, extracts an
//! artifact and checks it. A failing attempt never stops the others, and a
//! fault in the pipeline itself becomes a failed record instead of an error,
//! so `process` always yields exactly one record per task.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::executor::{Artifact, PromptError, TaskExecutor};
use crate::grid::grids_equal;
use crate::llm::{ChatMessage, ModelProvider};
use crate::metrics::{
    GenerationAttempt, OutcomeKind, ResultRecord, VerificationOutcome, secs,
};
use crate::recovery::{RetryPolicy, invoke};
use crate::sandbox::CodeRunner;
use crate::tasks::TaskDescriptor;
use crate::verifier::{Verdict, Verifier, VerifyReason};

const GENERATION_ERROR: &str = "GenerationError";
const EXTRACTION_ERROR: &str = "ExtractionError";

/// Runs every attempt for a task and assembles its record
pub struct TaskProcessor {
    provider: Arc<dyn ModelProvider>,
    executor: Arc<dyn TaskExecutor>,
    verifier: Verifier,
    retry: RetryPolicy,
    best_of: u32,
}

impl TaskProcessor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        executor: Arc<dyn TaskExecutor>,
        runner: Arc<dyn CodeRunner>,
    ) -> Self {
        Self {
            provider,
            executor,
            verifier: Verifier::new(runner),
            retry: RetryPolicy::default(),
            best_of: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_best_of(mut self, best_of: u32) -> Self {
        self.best_of = best_of.max(1);
        self
    }

    pub fn best_of(&self) -> u32 {
        self.best_of
    }

    /// Process `task`, never failing
    pub async fn process(&self, task: &TaskDescriptor) -> ResultRecord {
        let started = Instant::now();
        match self.try_process(task, started).await {
            Ok(record) => record,
            Err(fault) => {
                tracing::warn!(task_id = %task.task_id, "Task could not be processed: {}", fault);
                let mut record = ResultRecord::failed(&task.task_id, fault.to_string())
                    .with_task(task, self.executor.mode());
                record.best_of = self.best_of;
                record.total_latency_secs = secs(started.elapsed());
                record
            }
        }
    }

    async fn try_process(
        &self,
        task: &TaskDescriptor,
        started: Instant,
    ) -> Result<ResultRecord, PromptError> {
        let messages = self.executor.build_messages(task)?;
        let mut attempts = Vec::with_capacity(self.best_of as usize);
        let mut outcomes = Vec::with_capacity(self.best_of as usize);

        for index in 0..self.best_of {
            let (attempt, outcome) = self.attempt(task, &messages, index).await;
            tracing::info!(
                task_id = %task.task_id,
                attempt = index + 1,
                best_of = self.best_of,
                success = outcome.success,
                reason = %outcome.reason,
                "Attempt finished"
            );
            attempts.push(attempt);
            outcomes.push(outcome);
        }

        Ok(ResultRecord {
            task_id: task.task_id.clone(),
            timestamp: Utc::now(),
            mode: self.executor.mode(),
            task_data: Some(task.clone()),
            best_of: self.best_of,
            prompt_messages: messages,
            attempts,
            outcomes,
            total_latency_secs: secs(started.elapsed()),
            error: None,
        })
    }

    async fn attempt(
        &self,
        task: &TaskDescriptor,
        messages: &[ChatMessage],
        index: u32,
    ) -> (GenerationAttempt, VerificationOutcome) {
        let generation_started = Instant::now();
        let mut attempt = GenerationAttempt {
            attempt_index: index,
            raw_text: None,
            reasoning: None,
            artifact: None,
            error: None,
            latency_secs: 0.0,
        };

        let raw = invoke(&self.retry, || self.provider.generate(messages)).await;
        attempt.latency_secs = secs(generation_started.elapsed());

        let raw = match raw {
            Ok(raw) => raw,
            Err(error) => {
                attempt.error = Some(error.to_string());
                let mut outcome = VerificationOutcome::invalid_data(index, GENERATION_ERROR);
                outcome.detail = Some(error.to_string());
                return (attempt, outcome);
            }
        };

        let extraction = self.executor.extract(&raw);
        attempt.raw_text = Some(raw);
        let extraction = match extraction {
            Ok(extraction) => extraction,
            Err(error) => {
                tracing::debug!(task_id = %task.task_id, attempt = index + 1, "Extraction failed: {}", error);
                attempt.error = Some(error.to_string());
                let mut outcome = VerificationOutcome::invalid_data(index, EXTRACTION_ERROR);
                outcome.detail = Some(error.to_string());
                return (attempt, outcome);
            }
        };

        attempt.reasoning = extraction.reasoning;
        let verification_started = Instant::now();
        let verdict = match &extraction.artifact {
            Artifact::Code(code) => self.verifier.verify(code, task).await,
            Artifact::Answer(answer) => check_answer(answer.rows(), task),
        };
        attempt.artifact = Some(extraction.artifact);

        let outcome = VerificationOutcome {
            attempt_index: index,
            success: verdict.success,
            kind: outcome_kind(verdict.reason),
            reason: verdict.reason.to_string(),
            detail: verdict.detail,
            latency_secs: secs(verification_started.elapsed()),
        };
        (attempt, outcome)
    }
}

/// Compare a direct answer with the first test case
fn check_answer(answer: &[Vec<i64>], task: &TaskDescriptor) -> Verdict {
    let reason = match task.first_expected() {
        None => VerifyReason::MissingTestCases,
        Some(expected) if grids_equal(answer, expected.rows()) => VerifyReason::Passed,
        Some(_) => VerifyReason::OutputMismatch(0),
    };
    Verdict {
        success: reason == VerifyReason::Passed,
        reason,
        detail: None,
    }
}

fn outcome_kind(reason: VerifyReason) -> OutcomeKind {
    match reason {
        VerifyReason::Passed => OutcomeKind::Passed,
        VerifyReason::ExecutionError(_) => OutcomeKind::ExecutionError,
        VerifyReason::OutputMismatch(_) => OutcomeKind::OutputMismatch,
        VerifyReason::MissingTestCases => OutcomeKind::InvalidData,
    }
}
