use serde::{Deserialize, Serialize};

use super::SessionMode;

/// Everything the REPL printed for one command, up to and including the prompt
/// that finished it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub command: String,
    /// Stdout before the prompt.
    pub output: String,
    /// Stdout through the end of the prompt.
    pub raw: String,
    /// Prompt the command finished on.
    pub mode: SessionMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub source_path: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Session-scoped, assigned here. The REPL only knows breakpoints by file and line.
    pub id: u64,
    pub source_path: String,
    pub line: u32,
    pub verified: bool,
}

/// Result of `dbstatus` for one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointStatus {
    pub script: String,
    pub lines: Vec<u32>,
}

/// One `Columns m through n` slice of a wide array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBlock {
    pub first: usize,
    pub last: usize,
    pub values: Vec<String>,
}

/// The REPL's rendering of an expression, left as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub text: String,
}

impl EvaluateResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Column blocks, when the value was printed as a wide array.
    pub fn columns(&self) -> Vec<ColumnBlock> {
        crate::decode::array_columns(&self.text)
    }

    /// Array values in column order, or an empty list for scalars and text.
    pub fn values(&self) -> Vec<String> {
        self.columns()
            .into_iter()
            .flat_map(|block| block.values)
            .collect()
    }
}
