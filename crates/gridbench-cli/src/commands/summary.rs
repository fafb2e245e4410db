//! Result log summary command

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use gridbench_core::ResultLog;

/// Print pass rates and outcome counts for a result log
pub async fn execute(log_path: &Path) -> Result<ExitCode> {
    let log = ResultLog::read(log_path)
        .await
        .with_context(|| format!("failed to read result log {}", log_path.display()))?;

    println!("Result log: {}", log_path.display());
    match &log.metadata {
        Some(metadata) => {
            println!(
                "Run: {} ({}, {}, best_of={})",
                metadata.status, metadata.model_identifier, metadata.mode, metadata.best_of
            );
            println!("Started: {}", metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Runtime: {:.1}s", metadata.total_runtime_secs);
            if let Some(error) = &metadata.error {
                println!("Error: {}", error);
            }
        }
        None => println!("Run: not finalized (no metadata line)"),
    }
    if log.skipped_lines > 0 {
        println!("Unreadable lines skipped: {}", log.skipped_lines);
    }
    if log.duplicate_lines > 0 {
        println!("Repeated records ignored: {}", log.duplicate_lines);
    }

    println!("\n{}", log.summary());
    Ok(ExitCode::SUCCESS)
}
