//! Task executors
//!
//! An executor owns the prompt for a solve mode and knows how to pull an
//! artifact (code or an answer grid) out of the model's raw text.

mod code;
mod direct;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Grid;
use crate::llm::ChatMessage;
use crate::tasks::TaskDescriptor;

pub use code::CodeGenerationExecutor;
pub use direct::DirectAnswerExecutor;

/// How a task is solved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// The model writes a solver; it is verified against every test case
    #[default]
    Code,
    /// The model answers the first test input directly
    Direct,
}

impl SolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Direct => "direct",
        }
    }
}

impl std::fmt::Display for SolveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown solve mode '{}'", other)),
        }
    }
}

/// What an attempt produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Code(String),
    Answer(Grid),
}

/// Artifact plus the free text preceding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub reasoning: Option<String>,
    pub artifact: Artifact,
}

/// The task cannot be turned into a prompt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("task has no training examples")]
    MissingTrainExamples,
    #[error("task has no test input")]
    MissingTestInput,
}

/// No usable artifact in the model output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no python code block in response")]
    NoCodeBlock,
    #[error("no output grid in response")]
    NoGrid,
    #[error("answer is not a valid grid: {0}")]
    InvalidGrid(String),
}

/// Builds prompts and extracts artifacts for one solve mode
pub trait TaskExecutor: Send + Sync {
    fn mode(&self) -> SolveMode;

    /// Messages sent for every attempt on `task`
    fn build_messages(&self, task: &TaskDescriptor) -> Result<Vec<ChatMessage>, PromptError>;

    /// Pull the artifact out of raw model text
    fn extract(&self, raw: &str) -> Result<Extraction, ExtractError>;
}

/// Training examples rendered as the opening of the user prompt
pub(crate) fn render_examples(task: &TaskDescriptor) -> Result<String, PromptError> {
    if task.train_examples.is_empty() {
        return Err(PromptError::MissingTrainExamples);
    }

    let mut content = String::from("Here are the training examples:\n\n");
    for (i, example) in task.train_examples.iter().enumerate() {
        content.push_str(&format!("Example {}:\n", i + 1));
        content.push_str(&format!("Input: {}\n", to_json(&example.input)));
        content.push_str(&format!("Output: {}\n\n", to_json(&example.output)));
    }
    Ok(content)
}

pub(crate) fn to_json(grid: &Grid) -> String {
    serde_json::to_string(grid.rows()).unwrap_or_default()
}

/// Text before byte offset `end`, or `None` when blank
pub(crate) fn leading_text(raw: &str, end: usize) -> Option<String> {
    let text = raw[..end].trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Creates the executor for `mode`
pub fn executor_for(mode: SolveMode, entry_point: &str) -> Arc<dyn TaskExecutor> {
    match mode {
        SolveMode::Code => Arc::new(CodeGenerationExecutor::new(entry_point)),
        SolveMode::Direct => Arc::new(DirectAnswerExecutor::new()),
    }
}
