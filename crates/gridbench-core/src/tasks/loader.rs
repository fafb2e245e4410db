//! Task sources
//!
//! Tasks are pulled lazily by the coordinator, one at a time, so sources are
//! exposed as a stream. Three on-disk layouts are supported:
//!
//! - a dataset file holding a JSON array of tasks (or an object keyed by id)
//! - a directory of `{task_id}.json` files, read one file per pull
//! - a JSONL file with one task per line, read one line per pull
//!
//! Entries that fail to parse are skipped with a warning. I/O failures are
//! yielded as errors and abort the run.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::TaskDescriptor;
use crate::error::SourceError;

/// Stream of tasks consumed by the coordinator
pub type TaskStream = BoxStream<'static, Result<TaskDescriptor, SourceError>>;

/// Half-open index range over the selected tasks, written `[start:end]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl TaskRange {
    pub fn contains(&self, index: usize) -> bool {
        self.start.is_none_or(|s| index >= s) && self.end.is_none_or(|e| index < e)
    }
}

impl FromStr for TaskRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim();
        let inner = inner
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(inner);
        let (start, end) = inner
            .split_once(':')
            .ok_or_else(|| format!("invalid task range '{}', expected [start:end]", s))?;

        let parse = |part: &str| -> Result<Option<usize>, String> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse()
                    .map(Some)
                    .map_err(|_| format!("invalid index '{}' in task range '{}'", part, s))
            }
        };

        let range = Self {
            start: parse(start)?,
            end: parse(end)?,
        };
        if let (Some(s), Some(e)) = (range.start, range.end) {
            if e < s {
                return Err(format!("task range end {} is before start {}", e, s));
            }
        }
        Ok(range)
    }
}

impl fmt::Display for TaskRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<usize>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "[{}:{}]", show(self.start), show(self.end))
    }
}

/// Which tasks of a source to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSelection {
    /// Only these task IDs (empty = all)
    #[serde(default)]
    pub task_ids: Vec<String>,

    /// Index range applied after the ID filter
    #[serde(default)]
    pub range: Option<TaskRange>,

    /// Upper bound on the number of tasks
    #[serde(default)]
    pub max_tasks: Option<usize>,
}

impl TaskSelection {
    pub fn with_task_ids(mut self, ids: Vec<String>) -> Self {
        self.task_ids = ids;
        self
    }

    pub fn with_range(mut self, range: TaskRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = Some(max);
        self
    }

    /// Apply the selection to a stream. Errors always pass through.
    pub fn apply(&self, tasks: TaskStream) -> TaskStream {
        let ids: HashSet<String> = self.task_ids.iter().cloned().collect();
        let range = self.range.unwrap_or_default();
        let mut index = 0usize;

        let selected = tasks.filter_map(move |item| {
            let keep = match &item {
                Ok(task) if !ids.is_empty() && !ids.contains(&task.task_id) => false,
                Ok(_) => {
                    let position = index;
                    index += 1;
                    range.contains(position)
                }
                Err(_) => true,
            };
            futures::future::ready(keep.then_some(item))
        });

        match self.max_tasks {
            Some(max) => selected.take(max).boxed(),
            None => selected.boxed(),
        }
    }
}

/// On-disk layout of a task collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    /// A single JSON document with every task
    Dataset(PathBuf),
    /// A directory of per-task JSON files
    Directory(PathBuf),
    /// One task per line
    Jsonl(PathBuf),
}

impl TaskSource {
    /// Pick the layout from the path
    pub fn detect(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        if path.is_dir() {
            Self::Directory(path)
        } else if path.extension().is_some_and(|ext| ext == "jsonl") {
            Self::Jsonl(path)
        } else {
            Self::Dataset(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Dataset(p) | Self::Directory(p) | Self::Jsonl(p) => p,
        }
    }

    /// Open the source as a lazy stream with the selection applied
    pub async fn open(&self, selection: &TaskSelection) -> Result<TaskStream, SourceError> {
        let tasks = match self {
            Self::Dataset(path) => open_dataset(path).await?,
            Self::Directory(path) => open_directory(path).await?,
            Self::Jsonl(path) => open_jsonl(path).await?,
        };
        Ok(selection.apply(tasks))
    }

    /// Collect every selected task, failing on the first source error
    pub async fn load_all(&self, selection: &TaskSelection) -> Result<Vec<TaskDescriptor>, SourceError> {
        let mut tasks = self.open(selection).await?;
        let mut loaded = Vec::new();
        while let Some(task) = tasks.next().await {
            loaded.push(task?);
        }
        Ok(loaded)
    }
}

/// Parse one entry, filling the ID from `fallback_id` when absent
fn parse_entry(value: Value, fallback_id: Option<&str>, origin: &Path) -> Option<TaskDescriptor> {
    match serde_json::from_value::<TaskDescriptor>(value) {
        Ok(mut task) => {
            if task.task_id.is_empty() {
                match fallback_id {
                    Some(id) => task.task_id = id.to_string(),
                    None => {
                        tracing::warn!(source = %origin.display(), "Skipping task without task_id");
                        return None;
                    }
                }
            }
            Some(task)
        }
        Err(e) => {
            tracing::warn!(
                source = %origin.display(),
                task_id = fallback_id.unwrap_or("?"),
                "Skipping malformed task: {}",
                e
            );
            None
        }
    }
}

async fn open_dataset(path: &Path) -> Result<TaskStream, SourceError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;
    let document: Value =
        serde_json::from_str(&content).map_err(|e| SourceError::format(path, e.to_string()))?;

    let entries: Vec<(Option<String>, Value)> = match document {
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        _ => {
            return Err(SourceError::format(
                path,
                "expected a JSON array or an object keyed by task id",
            ));
        }
    };

    let origin = path.to_path_buf();
    let tasks = stream::iter(entries)
        .filter_map(move |(id, value)| {
            futures::future::ready(parse_entry(value, id.as_deref(), &origin).map(Ok))
        })
        .boxed();
    Ok(tasks)
}

async fn open_directory(path: &Path) -> Result<TaskStream, SourceError> {
    let mut reader = tokio::fs::read_dir(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;

    let mut files = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| SourceError::io(path, e))?
    {
        let file = entry.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();
    tracing::debug!("Found {} task files in {}", files.len(), path.display());

    let tasks = stream::iter(files)
        .then(|file| async move {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| SourceError::io(&file, e))?;
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = match serde_json::from_str::<Value>(&content) {
                Ok(value) => parse_entry(value, Some(&stem), &file),
                Err(e) => {
                    tracing::warn!(source = %file.display(), "Skipping unreadable task file: {}", e);
                    None
                }
            };
            Ok::<_, SourceError>(parsed)
        })
        .filter_map(|item| futures::future::ready(item.transpose()))
        .boxed();
    Ok(tasks)
}

async fn open_jsonl(path: &Path) -> Result<TaskStream, SourceError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;
    let lines = BufReader::new(file).lines();
    let origin = path.to_path_buf();

    let tasks = stream::unfold(
        (Some(lines), origin, 0usize),
        |(lines, origin, mut line_no)| async move {
            let mut lines = lines?;
            loop {
                line_no += 1;
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return None,
                    Err(e) => {
                        let err = SourceError::io(&origin, e);
                        return Some((Err(err), (None, origin, line_no)));
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let parsed = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => parse_entry(value, None, &origin),
                    Err(e) => {
                        tracing::warn!(
                            source = %origin.display(),
                            line = line_no,
                            "Skipping unparseable line: {}",
                            e
                        );
                        None
                    }
                };
                if let Some(task) = parsed {
                    return Some((Ok(task), (Some(lines), origin, line_no)));
                }
            }
        },
    )
    .boxed();
    Ok(tasks)
}
