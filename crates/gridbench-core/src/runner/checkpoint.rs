//! Append-only result log
//!
//! Records are written as JSON lines in completion order. Incremental writes
//! happen once `interval` unflushed records have accumulated; finalization
//! flushes whatever is left and appends the single metadata line. Lines are
//! only ever appended, so a crash loses at most the unflushed window.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{EvalError, EvalResult};
use crate::executor::SolveMode;
use crate::metrics::{LogEntry, ResultRecord, RunMetadata};

/// Clears the saving flag when a write ends, including on error
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Persists run results to a JSONL file
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    interval: usize,
    /// Records already written, as an index into the results list
    flushed: AtomicUsize,
    saving: AtomicBool,
    finalized: AtomicBool,
}

impl CheckpointWriter {
    pub fn new(path: impl Into<PathBuf>, interval: usize) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(1),
            flushed: AtomicUsize::new(0),
            saving: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        }
    }

    /// Writer for a run-scoped file under `output_dir`
    pub fn for_run(
        output_dir: impl AsRef<Path>,
        mode: SolveMode,
        started_at: DateTime<Utc>,
        interval: usize,
    ) -> Self {
        let name = format!(
            "{}_benchmark_results_{}.jsonl",
            mode,
            started_at.format("%Y%m%d_%H%M%S")
        );
        Self::new(output_dir.as_ref().join(name), interval)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far
    pub fn flushed(&self) -> usize {
        self.flushed.load(Ordering::Acquire)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn try_begin_save(&self) -> Option<SavingGuard<'_>> {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SavingGuard(&self.saving))
    }

    /// Write records added since the last write, once at least `interval`
    /// of them are pending. Returns the number of records written.
    pub async fn append_new(&self, results: &[ResultRecord]) -> EvalResult<usize> {
        if self.is_finalized() {
            return Ok(0);
        }
        let start = self.flushed();
        if results.len().saturating_sub(start) < self.interval {
            return Ok(0);
        }
        let Some(_guard) = self.try_begin_save() else {
            tracing::debug!("Checkpoint write already in progress, deferring");
            return Ok(0);
        };

        // Re-read under the flag in case a write finished in between
        let start = self.flushed();
        let pending = &results[start.min(results.len())..];
        let entries = pending.iter().cloned().map(LogEntry::Result);
        self.write_entries(entries).await?;
        self.flushed.store(start + pending.len(), Ordering::Release);

        tracing::info!(
            written = pending.len(),
            total = start + pending.len(),
            path = %self.path.display(),
            "Saved intermediate results"
        );
        Ok(pending.len())
    }

    /// Flush every pending record and append the metadata line.
    ///
    /// Only the first call writes; later calls return `Ok(false)`.
    pub async fn finalize(&self, results: &[ResultRecord], metadata: &RunMetadata) -> EvalResult<bool> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            tracing::debug!("Results already finalized");
            return Ok(false);
        }

        let _guard = loop {
            if let Some(guard) = self.try_begin_save() {
                break guard;
            }
            tokio::task::yield_now().await;
        };

        let start = self.flushed();
        let pending = &results[start.min(results.len())..];
        let entries = pending
            .iter()
            .cloned()
            .map(LogEntry::Result)
            .chain(std::iter::once(LogEntry::Metadata(metadata.clone())));
        self.write_entries(entries).await?;
        self.flushed.store(start + pending.len(), Ordering::Release);

        tracing::info!(
            status = %metadata.status,
            records = start + pending.len(),
            path = %self.path.display(),
            "Final results saved"
        );
        Ok(true)
    }

    /// Append `entries` as one buffered write.
    ///
    /// `flushed` only advances after the write succeeds, so a write that fails
    /// partway can leave lines that are written again by the next call.
    /// `ResultLog` drops such repeated records when reading.
    async fn write_entries(&self, entries: impl Iterator<Item = LogEntry>) -> EvalResult<()> {
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&serde_json::to_string(&entry)?);
            buffer.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EvalError::checkpoint(parent, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| EvalError::checkpoint(&self.path, e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| EvalError::checkpoint(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| EvalError::checkpoint(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ResultLog, RunContext, RunInfo, RunStatus};

    fn records(n: usize) -> Vec<ResultRecord> {
        (0..n)
            .map(|i| {
                let mut record = ResultRecord::failed(format!("task-{i}"), "");
                record.error = None;
                record
            })
            .collect()
    }

    fn metadata(status: RunStatus) -> RunMetadata {
        RunContext::new(RunInfo {
            mode: SolveMode::Code,
            model_identifier: "m".into(),
            best_of: 1,
            max_concurrent_tasks: 1,
            config: serde_json::Value::Null,
        })
        .metadata(status, None)
    }

    async fn read(path: &Path) -> ResultLog {
        ResultLog::read(path).await.unwrap()
    }

    #[test]
    fn test_run_scoped_path() {
        let started = DateTime::parse_from_rfc3339("2024-05-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        let writer = CheckpointWriter::for_run("out", SolveMode::Code, started, 5);
        assert_eq!(
            writer.path(),
            Path::new("out/code_benchmark_results_20240501_123045.jsonl")
        );
    }

    #[tokio::test]
    async fn test_append_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");
        let writer = CheckpointWriter::new(&path, 5);
        let all = records(10);

        for n in 1..5 {
            assert_eq!(writer.append_new(&all[..n]).await.unwrap(), 0);
        }
        assert!(!path.exists());

        assert_eq!(writer.append_new(&all[..5]).await.unwrap(), 5);
        assert_eq!(writer.flushed(), 5);
        assert_eq!(read(&path).await.records.len(), 5);

        assert_eq!(writer.append_new(&all[..7]).await.unwrap(), 0);
        assert_eq!(writer.append_new(&all[..10]).await.unwrap(), 5);

        let log = read(&path).await;
        let ids: Vec<_> = log.records.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids[0], "task-0");
        assert_eq!(ids[9], "task-9");
    }

    #[tokio::test]
    async fn test_finalize_flushes_pending_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = CheckpointWriter::new(&path, 5);
        let all = records(7);

        writer.append_new(&all[..5]).await.unwrap();
        assert!(writer.finalize(&all, &metadata(RunStatus::Interrupted)).await.unwrap());
        assert!(!writer.finalize(&all, &metadata(RunStatus::Completed)).await.unwrap());
        assert_eq!(writer.append_new(&records(20)).await.unwrap(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let metadata_lines = content
            .lines()
            .filter(|l| l.contains("\"entry_type\":\"metadata\""))
            .count();
        assert_eq!(metadata_lines, 1);
        assert!(content.lines().last().unwrap().contains("\"entry_type\":\"metadata\""));

        let log = read(&path).await;
        assert_eq!(log.records.len(), 7);
        assert_eq!(log.metadata.unwrap().status, RunStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_concurrent_finalize_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = std::sync::Arc::new(CheckpointWriter::new(&path, 1));
        let all = records(3);
        let meta = metadata(RunStatus::Completed);

        let (a, b) = tokio::join!(writer.finalize(&all, &meta), writer.finalize(&all, &meta));
        assert_ne!(a.unwrap(), b.unwrap());

        let log = read(&path).await;
        assert_eq!(log.records.len(), 3);
        assert!(log.metadata.is_some());
    }

    #[tokio::test]
    async fn test_finalize_with_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = CheckpointWriter::new(&path, 5);

        writer.finalize(&[], &metadata(RunStatus::Completed)).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
