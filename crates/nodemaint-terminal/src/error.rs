//! Error types for the nodemaint-terminal crate.

use thiserror::Error;

/// All errors that can originate from launching a child process.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The child could not be spawned (missing binary, permissions, bad cwd).
    #[error("spawn failed for `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child or collecting its output failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TerminalError>;
