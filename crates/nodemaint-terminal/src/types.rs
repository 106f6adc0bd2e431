//! Shared data types for nodemaint-terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "target")]
pub enum Invocation {
    /// A command line interpreted by `sh -c`.
    Shell(String),

    /// An executable file launched directly with no arguments.
    Program(PathBuf),
}

impl Invocation {
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    pub fn program(path: impl Into<PathBuf>) -> Self {
        Self::Program(path.into())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Shell(cmd) => write!(f, "{cmd}"),
            Invocation::Program(path) => write!(f, "{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecOptions
// ---------------------------------------------------------------------------

/// Per-launch knobs. `ExecOptions::default()` inherits the caller's cwd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

// ---------------------------------------------------------------------------
// ExecResult
// ---------------------------------------------------------------------------

/// Outcome of one finished child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Process exit code; `-1` when the child was killed by a signal.
    pub exit_code: i32,

    /// Captured standard output, byte for byte.
    pub stdout: Vec<u8>,

    /// Captured standard error, byte for byte.
    pub stderr: Vec<u8>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
