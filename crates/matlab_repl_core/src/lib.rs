//! MATLAB REPL Core
//!
//! Drives a MATLAB command-line REPL over its standard streams. Commands are
//! written to stdin in order and settled by the prompt that follows their
//! output, with the debug prompt (`K>> `) distinguished from the shell prompt
//! (`>> `). On top of that sit typed debugging operations (breakpoints,
//! stepping, evaluation, stack traces) and an event stream for the client.

pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod grammar;
pub mod ops;
pub mod queue;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::ReplConfig;
pub use error::ReplError;
pub use events::{EventEmitter, SessionEvent};
pub use session::{PendingReply, ReplSession};

/// Result type alias using ReplError
pub type Result<T> = std::result::Result<T, ReplError>;
