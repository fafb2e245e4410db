//! Python interpreter sandbox
//!
//! Each call spawns a fresh interpreter running a small harness script. The
//! harness reads one JSON request from stdin, loads the generated code into a
//! uniquely named module, calls the entry point on a deep copy of the input
//! and writes one JSON reply to stdout. The child is killed on drop, so it is
//! discarded on every exit path including a caller timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use super::{CodeRunner, SandboxError};
use crate::grid::{Grid, Rows};

const HARNESS: &str = include_str!("harness.py");

/// Longest stderr tail kept in an error detail
const MAX_STDERR: usize = 2000;

/// Reply written by the harness
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessReply {
    Ok { output: Rows },
    Syntax { detail: String },
    MissingEntryPoint { detail: String },
    Runtime { detail: String },
    InvalidOutput { detail: String },
}

/// Sandbox backed by a Python interpreter subprocess
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: String,
    entry_point: String,
    timeout: Option<Duration>,
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            entry_point: "solve_task".to_string(),
            timeout: None,
        }
    }
}

impl PythonSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpreter executable (default `python3`)
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Function the generated code must define (default `solve_task`)
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Wall-clock limit per call
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn module_name(attempt_id: &str) -> String {
        let tag: String = attempt_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("generated_solver_{}_{}", tag, Uuid::new_v4().simple())
    }

    fn stderr_tail(stderr: &[u8]) -> String {
        let text = String::from_utf8_lossy(stderr);
        let text = text.trim();
        let start = text.len().saturating_sub(MAX_STDERR);
        let start = (start..text.len())
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(text.len());
        text[start..].to_string()
    }

    fn interpret(output: std::process::Output) -> Result<Grid, SandboxError> {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<HarnessReply>(line).ok());

        match reply {
            Some(HarnessReply::Ok { output }) => {
                Grid::try_from(output).map_err(|e| SandboxError::invalid_output(e.to_string()))
            }
            Some(HarnessReply::Syntax { detail }) => Err(SandboxError::syntax(detail)),
            Some(HarnessReply::MissingEntryPoint { detail }) => {
                Err(SandboxError::missing_entry_point(detail))
            }
            Some(HarnessReply::Runtime { detail }) => Err(SandboxError::runtime(detail)),
            Some(HarnessReply::InvalidOutput { detail }) => Err(SandboxError::invalid_output(detail)),
            None => Err(SandboxError::runtime(format!(
                "interpreter exited with {} without a result: {}",
                output.status,
                Self::stderr_tail(&output.stderr)
            ))),
        }
    }
}

#[async_trait]
impl CodeRunner for PythonSandbox {
    async fn run(&self, code: &str, input: &Grid, attempt_id: &str) -> Result<Grid, SandboxError> {
        let module = Self::module_name(attempt_id);
        let request = json!({
            "code": code,
            "input": input,
            "module": module,
            "entry_point": self.entry_point,
        });
        let payload = serde_json::to_vec(&request)
            .map_err(|e| SandboxError::runtime(format!("failed to encode request: {}", e)))?;

        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(HARNESS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::runtime(format!("failed to start {}: {}", self.interpreter, e))
            })?;

        tracing::trace!(module = %module, "Spawned sandbox interpreter");

        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                // A write failure means the child already exited; its output says why.
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("Sandbox stdin closed early: {}", e);
                }
            }
            child.wait_with_output().await
        };

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| SandboxError::timeout(limit))?,
            None => exchange.await,
        }
        .map_err(|e| SandboxError::runtime(format!("failed to collect output: {}", e)))?;

        Self::interpret(output)
    }
}
