//! Gridbench command-line interface
//!
//! Runs grid reasoning benchmarks against a language model and inspects the
//! resulting logs.
//!
//! ```bash
//! gridbench run --dataset data/dataset.json --model openai/gpt-4o-mini --best-of 3
//! gridbench summary results/code_benchmark_results_20240501_120000.jsonl
//! gridbench verify results/code_benchmark_results_20240501_120000.jsonl
//! gridbench tasks --dataset data/tasks/ --max-tasks 10
//! ```
//!
//! API keys are read from the environment, and a `.env` file in the working
//! directory is loaded first.

mod args;
mod commands;
mod logging;
mod router;
mod signal_handler;

use std::process::ExitCode;

use clap::Parser;

use args::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match router::route(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
