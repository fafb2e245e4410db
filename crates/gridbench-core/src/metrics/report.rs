//! Reading result logs back
//!
//! Used by offline commands that summarize or re-verify a finished run.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::types::{LogEntry, OutcomeKind, ResultRecord, RunMetadata};
use crate::error::{EvalError, EvalResult};

/// Parsed contents of a result log
#[derive(Debug, Default)]
pub struct ResultLog {
    pub records: Vec<ResultRecord>,
    /// Last metadata line, if the run was finalized
    pub metadata: Option<RunMetadata>,
    /// Lines that could not be parsed
    pub skipped_lines: usize,
    /// Records written more than once, e.g. after a failed partial write
    pub duplicate_lines: usize,
}

impl ResultLog {
    /// Read a JSONL result log
    pub async fn read(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EvalError::checkpoint(path, e))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut log = Self::default();
        let mut seen: HashSet<(String, DateTime<Utc>)> = HashSet::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(LogEntry::Result(record)) => {
                    if seen.insert((record.task_id.clone(), record.timestamp)) {
                        log.records.push(record);
                    } else {
                        log.duplicate_lines += 1;
                    }
                }
                Ok(LogEntry::Metadata(metadata)) => log.metadata = Some(metadata),
                Err(e) => {
                    tracing::warn!(line = line_no + 1, "Skipping unreadable log line: {}", e);
                    log.skipped_lines += 1;
                }
            }
        }
        log
    }

    pub fn summary(&self) -> LogSummary {
        let mut summary = LogSummary {
            tasks: self.records.len(),
            ..LogSummary::default()
        };
        for record in &self.records {
            if record.error.is_some() {
                summary.faulted += 1;
            }
            if record.solved() {
                summary.solved += 1;
            }
            if record.solved_first_attempt() {
                summary.solved_first_attempt += 1;
            }
            for outcome in &record.outcomes {
                summary.attempts += 1;
                match outcome.kind {
                    OutcomeKind::Passed => summary.passed += 1,
                    OutcomeKind::OutputMismatch => summary.mismatch += 1,
                    OutcomeKind::ExecutionError => summary.execution_error += 1,
                    OutcomeKind::InvalidData => summary.invalid_data += 1,
                }
            }
        }
        summary
    }
}

/// Aggregate view of a result log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub tasks: usize,
    pub faulted: usize,
    pub solved: usize,
    pub solved_first_attempt: usize,
    pub attempts: usize,
    pub passed: usize,
    pub mismatch: usize,
    pub execution_error: usize,
    pub invalid_data: usize,
}

impl LogSummary {
    fn percent(part: usize, whole: usize) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64 * 100.0
        }
    }

    /// Share of tasks solved by the first attempt
    pub fn pass_at_1(&self) -> f64 {
        Self::percent(self.solved_first_attempt, self.tasks)
    }

    /// Share of tasks solved by any attempt
    pub fn pass_at_best_of(&self) -> f64 {
        Self::percent(self.solved, self.tasks)
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tasks:           {}", self.tasks)?;
        writeln!(f, "Solved:          {}", self.solved)?;
        writeln!(f, "Faulted:         {}", self.faulted)?;
        writeln!(f, "pass@1:          {:.1}%", self.pass_at_1())?;
        writeln!(f, "pass@best_of:    {:.1}%", self.pass_at_best_of())?;
        writeln!(f, "Attempts:        {}", self.attempts)?;
        writeln!(f, "  passed:        {}", self.passed)?;
        writeln!(f, "  mismatch:      {}", self.mismatch)?;
        writeln!(f, "  exec error:    {}", self.execution_error)?;
        write!(f, "  invalid data:  {}", self.invalid_data)
    }
}
