use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    /// The snippet directory exists but could not be listed.
    #[error("cannot read snippet directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snippet started but waiting on it failed.
    #[error("snippet execution failed: {0}")]
    ExecutionFailed(#[from] nodemaint_terminal::TerminalError),
}

pub type Result<T> = std::result::Result<T, HookError>;
