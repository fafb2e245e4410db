//! CLI argument definitions using clap
//!
//! - gridbench run ...            # Run a benchmark
//! - gridbench verify <log>       # Re-verify code attempts in a result log
//! - gridbench summary <log>      # Print pass rates for a result log
//! - gridbench tasks ...          # List the tasks a source would yield

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gridbench")]
#[command(about = "Evaluate language models on grid reasoning tasks")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a benchmark and write a JSONL result log
    Run(RunArgs),

    /// Re-run every generated program in a result log against its task
    Verify {
        /// Result log to check
        log: PathBuf,

        /// Python interpreter used to run the programs
        #[arg(long, default_value = "python3")]
        interpreter: String,

        /// Function the programs must define
        #[arg(long, default_value = "solve_task")]
        entry_point: String,

        /// Limit for a single program run, e.g. "30s"
        #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },

    /// Print pass rates and outcome counts for a result log
    Summary {
        /// Result log to summarize
        log: PathBuf,
    },

    /// List the tasks a source would yield
    Tasks {
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Where tasks come from and which of them to take
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Dataset file, directory of task files, or JSONL file
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Only these task ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub task_ids: Vec<String>,

    /// Index range over the selected tasks, e.g. "[10:20]"
    #[arg(long, value_name = "RANGE")]
    pub task_range: Option<String>,

    /// Stop after this many tasks
    #[arg(long)]
    pub max_tasks: Option<usize>,
}

impl SelectionArgs {
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(dataset) = &self.dataset {
            pairs.push(("dataset".to_string(), dataset.display().to_string()));
        }
        if !self.task_ids.is_empty() {
            pairs.push(("task_ids".to_string(), self.task_ids.join(",")));
        }
        push(&mut pairs, "task_range", self.task_range.as_ref());
        push(&mut pairs, "max_tasks", self.max_tasks.as_ref());
        pairs
    }
}

/// Options for `gridbench run`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Solve mode: "code" or "direct"
    #[arg(long)]
    pub mode: Option<String>,

    /// Provider: openrouter, openai, local or local-template
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name sent to the provider
    #[arg(short, long)]
    pub model: Option<String>,

    /// Override the provider's base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[arg(long)]
    pub api_key_env: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Prompt template for raw completion endpoints: "chatml" or "im_sep"
    #[arg(long)]
    pub chat_template: Option<String>,

    /// Attempts per task
    #[arg(short = 'n', long)]
    pub best_of: Option<u32>,

    /// Tasks processed at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Directory for the result log
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Completed tasks between incremental log writes
    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    /// Provider calls per attempt before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Limit for a single provider call, e.g. "10m"
    #[arg(long)]
    pub timeout: Option<String>,

    /// Python interpreter for generated programs
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Limit for a single program run, e.g. "30s"
    #[arg(long)]
    pub sandbox_timeout: Option<String>,

    /// Extra settings as key=value, applied last
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,
}

impl RunArgs {
    /// Flags given on the command line, as configuration overrides
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut pairs = self.selection.overrides();
        push(&mut pairs, "mode", self.mode.as_ref());
        push(&mut pairs, "provider", self.provider.as_ref());
        push(&mut pairs, "model", self.model.as_ref());
        push(&mut pairs, "base_url", self.base_url.as_ref());
        push(&mut pairs, "api_key_env", self.api_key_env.as_ref());
        push(&mut pairs, "temperature", self.temperature.as_ref());
        push(&mut pairs, "max_tokens", self.max_tokens.as_ref());
        push(&mut pairs, "chat_template", self.chat_template.as_ref());
        push(&mut pairs, "best_of", self.best_of.as_ref());
        push(&mut pairs, "concurrency", self.concurrency.as_ref());
        if let Some(dir) = &self.output_dir {
            pairs.push(("output_dir".to_string(), dir.display().to_string()));
        }
        push(&mut pairs, "checkpoint_interval", self.checkpoint_interval.as_ref());
        push(&mut pairs, "max_retries", self.max_retries.as_ref());
        push(&mut pairs, "timeout", self.timeout.as_ref());
        push(&mut pairs, "interpreter", self.interpreter.as_ref());
        push(&mut pairs, "sandbox_timeout", self.sandbox_timeout.as_ref());
        pairs.extend(self.settings.iter().cloned());
        pairs
    }
}

fn push<T: ToString>(pairs: &mut Vec<(String, String)>, key: &str, value: Option<&T>) {
    if let Some(value) = value {
        pairs.push((key.to_string(), value.to_string()));
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_become_overrides() {
        let cli = Cli::parse_from([
            "gridbench",
            "run",
            "--dataset",
            "tasks.jsonl",
            "--task-ids",
            "a,b",
            "--mode",
            "direct",
            "-n",
            "3",
            "-j",
            "8",
            "--set",
            "backoff=2s",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let overrides = args.overrides();
        assert!(overrides.contains(&("dataset".into(), "tasks.jsonl".into())));
        assert!(overrides.contains(&("task_ids".into(), "a,b".into())));
        assert!(overrides.contains(&("mode".into(), "direct".into())));
        assert!(overrides.contains(&("best_of".into(), "3".into())));
        assert!(overrides.contains(&("concurrency".into(), "8".into())));
        assert_eq!(overrides.last(), Some(&("backoff".into(), "2s".into())));
    }

    #[test]
    fn test_unset_flags_produce_no_overrides() {
        assert!(RunArgs::default().overrides().is_empty());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("model = gpt").unwrap(),
            ("model".to_string(), "gpt".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_verify_defaults() {
        let cli = Cli::parse_from(["gridbench", "verify", "log.jsonl"]);
        match cli.command {
            Commands::Verify {
                log,
                interpreter,
                entry_point,
                timeout,
            } => {
                assert_eq!(log, PathBuf::from("log.jsonl"));
                assert_eq!(interpreter, "python3");
                assert_eq!(entry_point, "solve_task");
                assert_eq!(timeout, Duration::from_secs(30));
            }
            _ => panic!("expected verify"),
        }
    }
}
