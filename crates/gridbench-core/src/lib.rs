//! Gridbench core
//!
//! Evaluation harness for grid-transformation reasoning tasks. A model is
//! asked to solve each task, either by writing a `solve_task` function that
//! is run against the task's test inputs or by answering with the output
//! grid directly. Tasks run concurrently under a fixed limit and every result
//! is appended to a JSONL log as the run progresses.

pub mod error;
pub mod executor;
pub mod grid;
pub mod llm;
pub mod metrics;
pub mod recovery;
pub mod runner;
pub mod sandbox;
pub mod tasks;
pub mod verifier;

pub use error::{EvalError, EvalResult};
pub use executor::{SolveMode, TaskExecutor, executor_for};
pub use grid::{Grid, grids_equal};
pub use llm::{ModelProvider, ProviderSettings, build_provider};
pub use metrics::{ResultLog, ResultRecord, RunMetadata, RunStatus};
pub use runner::{BenchConfig, CheckpointWriter, ConfigLoader, Coordinator, TaskProcessor};
pub use sandbox::{CodeRunner, PythonSandbox, SandboxError};
pub use tasks::{TaskDescriptor, TaskSelection, TaskSource, TaskStream};
pub use verifier::{Verdict, Verifier, VerifyReason};
