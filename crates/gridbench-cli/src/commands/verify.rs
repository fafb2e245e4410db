//! Offline re-verification of a result log
//!
//! Every code attempt in the log is run again against the task data stored
//! in its record, and the fresh verdict is compared with the recorded one.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gridbench_core::{PythonSandbox, ResultLog, ResultRecord, Verifier};

/// Totals from re-verifying a log
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    pub passed: usize,
    /// Attempts whose fresh verdict differs from the recorded one
    pub disagreements: usize,
    /// Records without embedded task data
    pub skipped_records: usize,
}

/// Re-run every code attempt of every record
pub async fn reverify(verifier: &Verifier, records: &[ResultRecord]) -> VerifyReport {
    let mut report = VerifyReport::default();
    for record in records {
        let Some(task) = &record.task_data else {
            report.skipped_records += 1;
            continue;
        };
        for attempt in &record.attempts {
            let Some(code) = attempt.code() else {
                continue;
            };
            let verdict = verifier.verify(code, task).await;
            let recorded = record
                .outcomes
                .iter()
                .find(|o| o.attempt_index == attempt.attempt_index)
                .map(|o| o.success);

            report.checked += 1;
            if verdict.success {
                report.passed += 1;
            }
            if recorded != Some(verdict.success) {
                report.disagreements += 1;
                println!(
                    "{} attempt {}: recorded {}, now {}",
                    record.task_id,
                    attempt.attempt_index,
                    recorded.map_or("nothing".to_string(), |ok| ok.to_string()),
                    verdict.reason
                );
            }
        }
    }
    report
}

/// Re-verify a result log with a local Python sandbox
pub async fn execute(
    log_path: &Path,
    interpreter: String,
    entry_point: String,
    timeout: Duration,
) -> Result<ExitCode> {
    let log = ResultLog::read(log_path)
        .await
        .with_context(|| format!("failed to read result log {}", log_path.display()))?;

    let sandbox = PythonSandbox::new()
        .with_interpreter(interpreter)
        .with_entry_point(entry_point)
        .with_timeout(Some(timeout));
    let verifier = Verifier::new(Arc::new(sandbox));

    let report = reverify(&verifier, &log.records).await;
    println!(
        "\nChecked {} attempts: {} passed, {} disagree with the log",
        report.checked, report.passed, report.disagreements
    );
    if report.skipped_records > 0 {
        println!("Records without task data: {}", report.skipped_records);
    }

    if report.disagreements > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
