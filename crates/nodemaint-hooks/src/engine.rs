use std::path::{Path, PathBuf};
use std::time::Instant;

use nodemaint_core::types::exit;
use nodemaint_terminal::{excerpt, exec, ExecOptions, Invocation, TerminalError};
use tracing::{debug, info, warn};

use crate::error::{HookError, Result};
use crate::types::{SnippetPhase, SnippetRun, SnippetSetResult};

/// List the executable regular files in `dir`, sorted lexically by file name.
///
/// A missing directory is an empty set, not an error: nodes without hooks
/// simply have nothing to prepare or finish.
pub fn list_snippets(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HookError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut snippets: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect();
    snippets.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(snippets)
}

/// Run every snippet in `dir` sequentially; the highest exit code wins.
///
/// All entries run even after one fails, so every hook gets a chance to log
/// its own diagnosis. An entry that cannot be spawned counts as exit 127.
pub async fn run_snippet_set(phase: SnippetPhase, dir: &Path) -> Result<SnippetSetResult> {
    let snippets = list_snippets(dir)?;
    debug!(%phase, dir = %dir.display(), count = snippets.len(), "running snippet set");

    let mut runs = Vec::with_capacity(snippets.len());
    for path in snippets {
        let started = Instant::now();
        let exit_code = match exec(&Invocation::program(&path), &ExecOptions::default()).await {
            Ok(result) => {
                if !result.success() {
                    warn!(
                        %phase,
                        snippet = %path.display(),
                        exit_code = result.exit_code,
                        stderr = %excerpt::tail(&result.stderr, excerpt::DEFAULT_TAIL_LINES),
                        "snippet failed"
                    );
                }
                normalise(result.exit_code)
            }
            Err(TerminalError::Spawn { source, .. }) => {
                warn!(%phase, snippet = %path.display(), error = %source, "snippet could not be spawned");
                exit::SPAWN_FAILED
            }
            Err(e) => return Err(e.into()),
        };
        runs.push(SnippetRun {
            path,
            exit_code,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    let exit_code = runs.iter().map(|r| r.exit_code).max().unwrap_or(0);
    info!(%phase, runs = runs.len(), exit_code, "snippet set finished");

    Ok(SnippetSetResult {
        phase,
        runs,
        exit_code,
    })
}

/// Signal deaths (`-1`) must not lose against a clean `0` in the max.
fn normalise(code: i32) -> i32 {
    if code < 0 {
        255
    } else {
        code
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
