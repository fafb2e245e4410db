//! Task descriptor types
//!
//! A task is a handful of demonstration pairs plus one or more held-out test
//! cases. Both kinds of pair share the same shape.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// An input grid paired with the grid a correct solver produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: Grid,
    pub output: Grid,
}

/// A held-out pair used for verification
pub type TestCase = Example;

/// An immutable grid reasoning task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique task identifier
    #[serde(default, alias = "id")]
    pub task_id: String,

    /// Demonstration pairs shown to the model
    #[serde(default, rename = "train")]
    pub train_examples: Vec<Example>,

    /// Held-out pairs used to verify an answer
    #[serde(rename = "test")]
    pub test_cases: Vec<TestCase>,
}

impl TaskDescriptor {
    /// Create a task
    pub fn new(
        task_id: impl Into<String>,
        train_examples: Vec<Example>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            train_examples,
            test_cases,
        }
    }

    /// Expected output of the first test case, used by direct-answer scoring
    pub fn first_expected(&self) -> Option<&Grid> {
        self.test_cases.first().map(|case| &case.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_dataset_field_names() {
        let json = r#"{
            "task_id": "abc123",
            "train": [{"input": [[1]], "output": [[2]]}],
            "test": [{"input": [[3]], "output": [[4]]}]
        }"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_id, "abc123");
        assert_eq!(task.train_examples.len(), 1);
        assert_eq!(task.first_expected().unwrap().clone().into_rows(), vec![vec![4]]);
    }

    #[test]
    fn test_test_only_task_with_id_key() {
        let json = r#"{"id":"t1","test":[{"input":[[0,1]],"output":[[1,0]]}]}"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_id, "t1");
        assert!(task.train_examples.is_empty());
        assert_eq!(task.test_cases.len(), 1);
        assert_eq!(task.first_expected().unwrap().clone().into_rows(), vec![vec![1, 0]]);
    }

    #[test]
    fn test_missing_task_id_defaults_empty() {
        let json = r#"{"train": [], "test": []}"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert!(task.task_id.is_empty());
        assert!(task.first_expected().is_none());
    }

    #[test]
    fn test_ragged_grid_rejected() {
        let json = r#"{"train": [], "test": [{"input": [[1, 2], [3]], "output": [[1]]}]}"#;
        assert!(serde_json::from_str::<TaskDescriptor>(json).is_err());
    }
}
