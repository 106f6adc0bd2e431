//! One-shot execution: spawn, wait, capture.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{
    error::{Result, TerminalError},
    types::{ExecOptions, ExecResult, Invocation},
};

/// Run `invocation` to completion and capture its output.
///
/// stdin is closed (`/dev/null`) so a script waiting on input fails instead
/// of hanging forever on the scheduler's terminal.
///
/// # Errors
///
/// - `Spawn`: the child could not be started.
/// - `IoError`: waiting on the child failed.
pub async fn exec(invocation: &Invocation, options: &ExecOptions) -> Result<ExecResult> {
    let mut cmd = match invocation {
        Invocation::Shell(line) => {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        }
        Invocation::Program(path) => Command::new(path),
    };

    if let Some(ref cwd) = options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    debug!(command = %invocation, cwd = ?options.cwd, "exec");

    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TerminalError::Spawn {
            command: invocation.to_string(),
            source,
        })?;

    let output = child.wait_with_output().await?;
    let exit_code = output.status.code().unwrap_or(-1);

    debug!(command = %invocation, exit_code, "exec finished");

    Ok(ExecResult {
        exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_captures_stdout_and_exit_code() {
        let result = exec(&Invocation::shell("echo hello; exit 3"), &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout_lossy(), "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let result = exec(&Invocation::shell("echo oops >&2"), &ExecOptions::default())
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stderr_lossy(), "oops\n");
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn runs_in_requested_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let result = exec(&Invocation::shell("touch marker"), &ExecOptions::in_dir(dir.path()))
            .await
            .unwrap();
        assert!(result.success());
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn extra_env_is_visible_to_child() {
        let opts = ExecOptions::default().with_env("NODEMAINT_TEST_VAR", "42");
        let result = exec(&Invocation::shell("printf %s \"$NODEMAINT_TEST_VAR\""), &opts)
            .await
            .unwrap();
        assert_eq!(result.stdout_lossy(), "42");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = exec(
            &Invocation::program("/nonexistent/definitely-not-here"),
            &ExecOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TerminalError::Spawn { .. }));
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        // `read` fails immediately on EOF instead of blocking.
        let result = exec(&Invocation::shell("read line"), &ExecOptions::default())
            .await
            .unwrap();
        assert_ne!(result.exit_code, 0);
    }
}
