//! Task listing command

use std::process::ExitCode;

use anyhow::{Context, Result};
use futures::StreamExt;
use gridbench_core::runner::ConfigLoader;

use crate::args::SelectionArgs;

/// List the tasks the configured source yields after selection
pub async fn execute(selection: SelectionArgs) -> Result<ExitCode> {
    let config = ConfigLoader::new()
        .with_env()
        .with_overrides(selection.overrides())
        .load()
        .context("invalid configuration")?;

    let source = config.task_source();
    let mut tasks = source
        .open(&config.selection)
        .await
        .with_context(|| format!("failed to open tasks at {}", source.path().display()))?;

    println!("{:<24} {:>6} {:>6} {:>12}", "ID", "Train", "Test", "First input");
    println!("{:-<52}", "");

    let mut count = 0usize;
    while let Some(task) = tasks.next().await {
        let task = task.context("task source failed")?;
        let first_input = task
            .test_cases
            .first()
            .map(|case| format!("{}x{}", case.input.height(), case.input.width()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:>6} {:>6} {:>12}",
            task.task_id,
            task.train_examples.len(),
            task.test_cases.len(),
            first_input
        );
        count += 1;
    }

    println!("\nTotal: {} tasks", count);
    Ok(ExitCode::SUCCESS)
}
