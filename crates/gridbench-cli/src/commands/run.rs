//! Benchmark run command

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use gridbench_core::runner::{BenchConfig, ConfigLoader, Coordinator};
use gridbench_core::{CodeRunner, RunMetadata, RunStatus, build_provider};
use tokio_util::sync::CancellationToken;

use crate::args::RunArgs;
use crate::signal_handler::{INTERRUPTED_EXIT_CODE, SignalHandler};

/// Merge the config file, environment and command line flags
pub fn load_config(args: &RunArgs) -> Result<BenchConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }
    loader
        .with_env()
        .with_overrides(args.overrides())
        .load()
        .context("invalid configuration")
}

/// Run a benchmark to completion or interruption
pub async fn execute(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let provider = build_provider(&config.provider).context("failed to set up model provider")?;
    let runner: Arc<dyn CodeRunner> = Arc::new(config.sandbox.build());

    let source = config.task_source();
    let tasks = source
        .open(&config.selection)
        .await
        .with_context(|| format!("failed to open tasks at {}", source.path().display()))?;

    let coordinator = Coordinator::from_config(&config, provider, runner);
    let log_path = coordinator.checkpoint().path().to_path_buf();

    println!("Starting {} benchmark with {}", config.mode, config.provider.identifier());
    println!("Results: {}\n", log_path.display());

    let token = CancellationToken::new();
    let mut signals = SignalHandler::new(token.clone());
    signals.start().context("failed to install signal handler")?;

    let result = coordinator.run(tasks, token).await;
    let interrupted = signals.interrupted();
    signals.stop();

    let metadata = result.with_context(|| {
        format!("run aborted, partial results saved to {}", log_path.display())
    })?;
    print_summary(&metadata, &log_path);

    if interrupted || metadata.status == RunStatus::Interrupted {
        return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(metadata: &RunMetadata, log_path: &Path) {
    println!("\nRun {}: {}", metadata.status, metadata.model_identifier);
    println!(
        "Tasks solved: {}/{} ({} submitted)",
        metadata.tasks_solved, metadata.tasks_completed, metadata.tasks_submitted
    );
    println!(
        "Attempts passed: {} ({:.2}% of verified)",
        metadata.verification_passed, metadata.verification_pass_rate_percent
    );
    println!(
        "Failures: {} mismatch, {} execution, {} other, {} generation",
        metadata.verification_failed_mismatch,
        metadata.verification_failed_execution,
        metadata.verification_failed_other,
        metadata.generation_failed
    );
    println!("Runtime: {:.1}s", metadata.total_runtime_secs);
    println!("Log: {}", log_path.display());
}
