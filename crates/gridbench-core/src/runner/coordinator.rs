//! Bounded-concurrency run loop
//!
//! The coordinator pulls one task at a time from the source, and only after a
//! semaphore permit is held. Each admitted task runs as its own tokio task
//! holding the permit until it finishes. Completions are collected in arrival
//! order into the [`RunContext`], which only this loop touches. Every exit
//! path (completion, source failure, cancellation) ends in the checkpoint
//! writer's `finalize`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointWriter;
use super::config::BenchConfig;
use super::processor::TaskProcessor;
use crate::error::{EvalError, EvalResult};
use crate::executor::executor_for;
use crate::llm::ModelProvider;
use crate::metrics::{ResultRecord, RunContext, RunInfo, RunMetadata, RunStatus};
use crate::sandbox::CodeRunner;
use crate::tasks::TaskStream;

/// Drives a whole benchmark run
pub struct Coordinator {
    processor: Arc<TaskProcessor>,
    checkpoint: Arc<CheckpointWriter>,
    info: RunInfo,
}

impl Coordinator {
    pub fn new(processor: TaskProcessor, checkpoint: CheckpointWriter, info: RunInfo) -> Self {
        Self {
            processor: Arc::new(processor),
            checkpoint: Arc::new(checkpoint),
            info,
        }
    }

    /// Wire up a coordinator from configuration
    pub fn from_config(
        config: &BenchConfig,
        provider: Arc<dyn ModelProvider>,
        runner: Arc<dyn CodeRunner>,
    ) -> Self {
        let info = RunInfo {
            mode: config.mode,
            model_identifier: provider.identifier(),
            best_of: config.best_of,
            max_concurrent_tasks: config.concurrency,
            config: serde_json::to_value(config).unwrap_or_default(),
        };
        let processor = TaskProcessor::new(
            provider,
            executor_for(config.mode, &config.sandbox.entry_point),
            runner,
        )
        .with_retry(config.retry.clone())
        .with_best_of(config.best_of);
        let checkpoint = CheckpointWriter::for_run(
            &config.checkpoint.output_dir,
            config.mode,
            Utc::now(),
            config.checkpoint.interval,
        );
        Self::new(processor, checkpoint, info)
    }

    /// Shared handle to the result log writer
    pub fn checkpoint(&self) -> Arc<CheckpointWriter> {
        self.checkpoint.clone()
    }

    /// Run every task from `tasks` until the source is exhausted, the source
    /// fails, or `cancel` fires.
    ///
    /// A source failure is returned as an error after the log is finalized.
    pub async fn run(&self, mut tasks: TaskStream, cancel: CancellationToken) -> EvalResult<RunMetadata> {
        let limit = self.info.max_concurrent_tasks.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut running: JoinSet<ResultRecord> = JoinSet::new();
        let mut context = RunContext::new(self.info.clone());
        let mut source_open = true;
        let mut abort: Option<EvalError> = None;
        let mut interrupted = false;

        tracing::info!(
            concurrency = limit,
            best_of = self.info.best_of,
            mode = %self.info.mode,
            log = %self.checkpoint.path().display(),
            "Starting run"
        );

        loop {
            if !source_open && running.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::warn!(
                        in_flight = running.len(),
                        "Interrupt received, stopping admission"
                    );
                    interrupted = true;
                    running.abort_all();
                    break;
                }

                Some(joined) = running.join_next(), if !running.is_empty() => {
                    self.collect(&mut context, joined).await;
                }

                permit = semaphore.clone().acquire_owned(), if source_open => {
                    let permit = match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            tracing::error!("Admission closed unexpectedly: {}", e);
                            abort = Some(EvalError::Join(e.to_string()));
                            source_open = false;
                            continue;
                        }
                    };
                    match tasks.next().await {
                        Some(Ok(task)) => {
                            context.submitted();
                            tracing::debug!(task_id = %task.task_id, "Admitting task");
                            let processor = self.processor.clone();
                            let mode = self.info.mode;
                            running.spawn(async move {
                                let _permit = permit;
                                match AssertUnwindSafe(processor.process(&task)).catch_unwind().await {
                                    Ok(record) => record,
                                    Err(panic) => {
                                        let message = panic_message(panic.as_ref());
                                        tracing::error!(task_id = %task.task_id, "Task panicked: {}", message);
                                        ResultRecord::failed(&task.task_id, format!("task panicked: {}", message))
                                            .with_task(&task, mode)
                                    }
                                }
                            });
                        }
                        Some(Err(e)) => {
                            tracing::error!("Task source failed, no further tasks will be admitted: {}", e);
                            abort = Some(e.into());
                            source_open = false;
                        }
                        None => {
                            tracing::debug!("Task source exhausted");
                            source_open = false;
                        }
                    }
                }
            }
        }

        // Units that finished before the abort still yield their records
        while let Some(joined) = running.join_next().await {
            self.collect(&mut context, joined).await;
        }

        let status = run_status(interrupted, abort.is_some());
        let metadata = context.metadata(status, abort.as_ref().map(ToString::to_string));
        self.checkpoint.finalize(context.results(), &metadata).await?;

        tracing::info!(
            status = %status,
            completed = metadata.tasks_completed,
            solved = metadata.tasks_solved,
            pass_rate = metadata.verification_pass_rate_percent,
            runtime_secs = metadata.total_runtime_secs,
            "Run finished"
        );

        match abort {
            Some(e) => Err(e),
            None => Ok(metadata),
        }
    }

    async fn collect(&self, context: &mut RunContext, joined: Result<ResultRecord, JoinError>) {
        match joined {
            Ok(record) => {
                context.complete(record);
                if let Err(e) = self.checkpoint.append_new(context.results()).await {
                    tracing::error!("Failed to save intermediate results: {}", e);
                }
            }
            Err(e) if e.is_cancelled() => tracing::debug!("Dropped unfinished task: {}", e),
            Err(e) => tracing::error!("Worker task failed to join: {}", e),
        }
    }
}

fn run_status(interrupted: bool, aborted: bool) -> RunStatus {
    if interrupted {
        RunStatus::Interrupted
    } else if aborted {
        RunStatus::Aborted
    } else {
        RunStatus::Completed
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
