mod responses;

pub use responses::*;

use serde::{Deserialize, Serialize};

/// Which prompt the REPL last printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// `>> `, nothing paused.
    Shell,
    /// `K>> `, stopped inside a script or function.
    Debug,
}

impl SessionMode {
    pub fn is_paused(self) -> bool {
        self == SessionMode::Debug
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell => write!(f, "shell"),
            Self::Debug => write!(f, "debug"),
        }
    }
}
