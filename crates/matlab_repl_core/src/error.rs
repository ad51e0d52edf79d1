use thiserror::Error;

use crate::types::SessionMode;

#[derive(Error, Debug)]
pub enum ReplError {
    #[error("Failed to spawn REPL '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("REPL process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Command '{command}' rejected: {stderr}")]
    Rejected { command: String, stderr: String },

    #[error("Command '{command}' expected {expected} mode, REPL is in {found} mode")]
    WrongMode {
        command: String,
        expected: SessionMode,
        found: SessionMode,
    },

    #[error("Nothing to run: REPL is not paused and no program was given")]
    NothingToRun,

    #[error("REPL process terminated")]
    Terminated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplError {
    pub fn rejected(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// The REPL answered, but not with success. The session stays usable.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::WrongMode { .. })
    }
}
