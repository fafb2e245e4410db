//! Code generation mode

use std::sync::LazyLock;

use regex::Regex;

use super::{
    Artifact, ExtractError, Extraction, PromptError, SolveMode, TaskExecutor, leading_text,
    render_examples,
};
use crate::llm::ChatMessage;
use crate::tasks::TaskDescriptor;

static PYTHON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*\n(.*?)```").expect("valid code block regex"));

/// Asks the model for reasoning and a solver function
pub struct CodeGenerationExecutor {
    entry_point: String,
}

impl CodeGenerationExecutor {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an expert programmer solving a visual reasoning puzzle (ARC). \
You will see input-output grid pairs that demonstrate a hidden transformation rule.

1. Explain the reasoning: describe the rule that turns each input grid into its output grid.
2. Provide Python code: write a function named `{ep}` that takes one argument, the input grid \
as a list of lists of integers, and returns the output grid as a list of lists of integers. \
Use only the standard library; `numpy` is available as `np` and `copy` is preloaded.

Give your reasoning first, then the code in a single markdown block:

```python
def {ep}(input_grid):
    output_grid = input_grid
    return output_grid
```

Grid values 0-9 are colors: 0 black, 1 blue, 2 red, 3 green, 4 yellow, 5 grey, \
6 fuchsia, 7 orange, 8 teal, 9 brown.",
            ep = self.entry_point
        )
    }
}

impl TaskExecutor for CodeGenerationExecutor {
    fn mode(&self) -> SolveMode {
        SolveMode::Code
    }

    fn build_messages(&self, task: &TaskDescriptor) -> Result<Vec<ChatMessage>, PromptError> {
        let mut content = render_examples(task)?;
        content.push_str(&format!(
            "Based on these examples, provide the reasoning and the Python `{}` function as requested.",
            self.entry_point
        ));
        Ok(vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(content),
        ])
    }

    fn extract(&self, raw: &str) -> Result<Extraction, ExtractError> {
        let captures = PYTHON_BLOCK.captures(raw).ok_or(ExtractError::NoCodeBlock)?;
        let (Some(block), Some(code)) = (captures.get(0), captures.get(1)) else {
            return Err(ExtractError::NoCodeBlock);
        };
        let code = code.as_str().trim();
        if code.is_empty() {
            return Err(ExtractError::NoCodeBlock);
        }
        Ok(Extraction {
            reasoning: leading_text(raw, block.start()),
            artifact: Artifact::Code(code.to_string()),
        })
    }
}
