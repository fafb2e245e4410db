//! Direct answer mode

use std::sync::LazyLock;

use regex::Regex;

use super::{
    Artifact, ExtractError, Extraction, PromptError, SolveMode, TaskExecutor, leading_text,
    render_examples, to_json,
};
use crate::grid::{Grid, Rows};
use crate::llm::ChatMessage;
use crate::tasks::TaskDescriptor;

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)```").expect("valid json block regex"));

static BARE_GRID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\[.*?\]\s*\]").expect("valid grid literal regex"));

const SYSTEM_PROMPT: &str = "You are an expert at solving visual reasoning puzzles (ARC). \
You will see input-output grid pairs that demonstrate a hidden transformation rule, \
followed by a new input grid.

1. Explain the reasoning: describe the rule that turns each input grid into its output grid.
2. Give the answer: apply the rule to the new input and write the output grid as a JSON \
list of lists of integers.

Give your reasoning first, then the grid in a single markdown block:

```json
[[0, 1], [1, 0]]
```

Grid values 0-9 are colors: 0 black, 1 blue, 2 red, 3 green, 4 yellow, 5 grey, \
6 fuchsia, 7 orange, 8 teal, 9 brown.";

/// Asks the model for the output grid of the first test input
#[derive(Debug, Default)]
pub struct DirectAnswerExecutor;

impl DirectAnswerExecutor {
    pub fn new() -> Self {
        Self
    }

    fn parse_grid(text: &str) -> Result<Grid, ExtractError> {
        let rows: Rows =
            serde_json::from_str(text.trim()).map_err(|e| ExtractError::InvalidGrid(e.to_string()))?;
        Grid::try_from(rows).map_err(|e| ExtractError::InvalidGrid(e.to_string()))
    }
}

impl TaskExecutor for DirectAnswerExecutor {
    fn mode(&self) -> SolveMode {
        SolveMode::Direct
    }

    fn build_messages(&self, task: &TaskDescriptor) -> Result<Vec<ChatMessage>, PromptError> {
        let test_input = task
            .test_cases
            .first()
            .map(|case| &case.input)
            .ok_or(PromptError::MissingTestInput)?;

        let mut content = render_examples(task)?;
        content.push_str("Now, apply the pattern to this new input grid:\n\n");
        content.push_str(&format!("Input: {}\n\n", to_json(test_input)));
        content.push_str("Based on these examples, provide your reasoning and the output grid as requested.");

        Ok(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(content)])
    }

    fn extract(&self, raw: &str) -> Result<Extraction, ExtractError> {
        // A fenced block wins; otherwise fall back to the first bare grid literal
        let (start, grid) = match JSON_BLOCK.captures(raw) {
            Some(captures) => {
                let (Some(block), Some(body)) = (captures.get(0), captures.get(1)) else {
                    return Err(ExtractError::NoGrid);
                };
                (block.start(), Self::parse_grid(body.as_str())?)
            }
            None => {
                let literal = BARE_GRID.find(raw).ok_or(ExtractError::NoGrid)?;
                (literal.start(), Self::parse_grid(literal.as_str())?)
            }
        };

        Ok(Extraction {
            reasoning: leading_text(raw, start),
            artifact: Artifact::Answer(grid),
        })
    }
}
