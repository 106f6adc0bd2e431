use std::path::PathBuf;

use thiserror::Error;

use crate::authority::AuthorityError;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading or writing spool files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request's `data` file could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requests must take a positive number of seconds.
    #[error("Invalid estimate: {estimate}s (must be > 0)")]
    InvalidEstimate { estimate: i64 },

    /// No active or archived request with the given ID exists.
    #[error("Request not found: {reqid}")]
    RequestNotFound { reqid: u64 },

    /// The sequence counter file holds something other than an integer.
    #[error("Corrupt sequence file {}: {content:?}", path.display())]
    Sequence { path: PathBuf, content: String },

    /// Taking an advisory lock failed (not: the lock is busy; that blocks).
    #[error("Cannot lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory rejected or failed a call.
    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// A prepare/finish snippet set could not be run.
    #[error("Snippet error: {0}")]
    Snippet(#[from] nodemaint_hooks::HookError),

    /// A request's script could not be waited on.
    #[error("Execution error: {0}")]
    Exec(#[from] nodemaint_terminal::TerminalError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
