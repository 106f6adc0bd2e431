//! `nodemaint-hooks` — snippet sets run around a maintenance window.
//!
//! A snippet set is a directory of executables (`prepare.d/`, `finish.d/`).
//! Every executable regular file is run in lexical order and the set's result
//! is the highest exit code any entry produced.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::{list_snippets, run_snippet_set};
pub use error::{HookError, Result};
pub use types::{SnippetPhase, SnippetRun, SnippetSetResult};
