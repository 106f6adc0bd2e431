use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which side of the maintenance window a snippet set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetPhase {
    /// Runs after the node is marked out of service, before any request.
    Prepare,
    /// Runs after the node is marked back in service.
    Finish,
}

impl fmt::Display for SnippetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnippetPhase::Prepare => "prepare",
            SnippetPhase::Finish => "finish",
        };
        write!(f, "{s}")
    }
}

/// One executed entry of a snippet set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetRun {
    pub path: PathBuf,
    /// Normalised exit code: a signal death is reported as 255.
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of a whole snippet set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetSetResult {
    pub phase: SnippetPhase,
    /// Entries in the order they ran.
    pub runs: Vec<SnippetRun>,
    /// Maximum exit code across `runs`, 0 for an empty set.
    pub exit_code: i32,
}

impl SnippetSetResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Entries that returned nonzero.
    pub fn failures(&self) -> impl Iterator<Item = &SnippetRun> {
        self.runs.iter().filter(|r| r.exit_code != 0)
    }
}
