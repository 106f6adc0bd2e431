//! nodemaint-terminal — one-shot subprocess execution for maintenance scripts.
//!
//! Two ways to launch a child:
//! - `Invocation::Shell`: a command line run through `sh -c`
//! - `Invocation::Program`: an executable path run directly (snippet entries)
//!
//! The child's stdout/stderr are captured as raw bytes so callers can append
//! them verbatim to on-disk capture files. There is no timeout:
//! a hung child blocks the caller until it exits.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use nodemaint_terminal::{exec, ExecOptions, Invocation};
//!
//! #[tokio::main]
//! async fn main() {
//!     let inv = Invocation::shell("echo hello");
//!     let result = exec(&inv, &ExecOptions::default()).await.unwrap();
//!     println!("{} -> {}", result.exit_code, result.stdout_lossy());
//! }
//! ```

pub mod error;
pub mod excerpt;
pub mod exec;
pub mod types;

pub use error::{Result, TerminalError};
pub use exec::exec;
pub use types::{ExecOptions, ExecResult, Invocation};
