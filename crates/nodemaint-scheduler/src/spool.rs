//! Spool layout and the two advisory locks guarding it.
//!
//! Lock protocol:
//! - `.lock` is the session lock. Whoever holds `flock(LOCK_EX)` on it owns
//!   every directory under `requests/` and `archive/`. It is held for the
//!   lifetime of a [`SpoolLock`] and released on drop (implicit `LOCK_UN`
//!   when the descriptor closes), including on error paths.
//! - `.SEQ` has its own short-lived lock around read-increment-write, so IDs
//!   can be allocated from any process whether or not it holds `.lock`.
//! - The two locks never nest in the opposite order: `.SEQ` is only ever
//!   taken briefly, while `.lock` may or may not be held.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};

pub const REQUESTS_DIR: &str = "requests";
pub const ARCHIVE_DIR: &str = "archive";
pub const LOCK_FILE: &str = ".lock";
pub const SEQ_FILE: &str = ".SEQ";

/// Paths inside a spool root.
#[derive(Debug, Clone)]
pub struct Spool {
    root: PathBuf,
}

impl Spool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.root.join(REQUESTS_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn seq_path(&self) -> PathBuf {
        self.root.join(SEQ_FILE)
    }

    pub fn request_dir(&self, reqid: u64) -> PathBuf {
        self.requests_dir().join(reqid.to_string())
    }

    pub fn archived_dir(&self, reqid: u64) -> PathBuf {
        self.archive_dir().join(reqid.to_string())
    }

    /// Create `requests/` and `archive/` if missing. Idempotent.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.requests_dir())?;
        fs::create_dir_all(self.archive_dir())?;
        Ok(())
    }
}

/// Exclusive hold on a spool's `.lock`; released when dropped.
#[derive(Debug)]
pub struct SpoolLock {
    file: File,
    path: PathBuf,
}

impl SpoolLock {
    /// Block until the exclusive lock on `path` is ours.
    ///
    /// A second session on the same node waits here instead of running
    /// requests concurrently; the wait is logged so it is visible.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| SchedulerError::Lock {
                path: path.to_path_buf(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            info!(path = %path.display(), "spool is locked by another session, waiting");
            file.lock_exclusive().map_err(|source| SchedulerError::Lock {
                path: path.to_path_buf(),
                source,
            })?;
        }
        debug!(path = %path.display(), "spool lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpoolLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock anyway; unlocking first
        // makes the release visible in the log at the right moment.
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "spool lock released");
    }
}

/// Allocate the next request ID from the counter file at `seq_path`.
///
/// The file holds the last ID handed out; a missing or empty file counts as
/// 0, so the first ID is 1.
pub fn allocate_reqid(seq_path: &Path) -> Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(seq_path)
        .map_err(|source| SchedulerError::Lock {
            path: seq_path.to_path_buf(),
            source,
        })?;
    file.lock_exclusive().map_err(|source| SchedulerError::Lock {
        path: seq_path.to_path_buf(),
        source,
    })?;

    let result = bump(&mut file, seq_path);
    let _ = FileExt::unlock(&file);
    result
}

fn bump(file: &mut File, seq_path: &Path) -> Result<u64> {
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let trimmed = content.trim();
    let current: u64 = if trimmed.is_empty() {
        0
    } else {
        trimmed.parse().map_err(|_| SchedulerError::Sequence {
            path: seq_path.to_path_buf(),
            content: trimmed.to_string(),
        })?
    };

    let next = current + 1;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(format!("{next}\n").as_bytes())?;
    file.sync_all()?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn ids_start_at_one_and_increase() {
        let dir = tempfile::tempdir().unwrap();
        let seq = dir.path().join(SEQ_FILE);
        assert_eq!(allocate_reqid(&seq).unwrap(), 1);
        assert_eq!(allocate_reqid(&seq).unwrap(), 2);
        assert_eq!(allocate_reqid(&seq).unwrap(), 3);
        assert_eq!(fs::read_to_string(&seq).unwrap().trim(), "3");
    }

    #[test]
    fn existing_counter_is_continued() {
        let dir = tempfile::tempdir().unwrap();
        let seq = dir.path().join(SEQ_FILE);
        fs::write(&seq, "41\n").unwrap();
        assert_eq!(allocate_reqid(&seq).unwrap(), 42);
    }

    #[test]
    fn garbage_counter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let seq = dir.path().join(SEQ_FILE);
        fs::write(&seq, "forty-two").unwrap();
        assert!(matches!(
            allocate_reqid(&seq).unwrap_err(),
            SchedulerError::Sequence { .. }
        ));
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let seq = dir.path().join(SEQ_FILE);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = seq.clone();
                std::thread::spawn(move || {
                    (0..25).map(|_| allocate_reqid(&seq).unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(seen.iter().max(), Some(&200));
    }

    #[test]
    fn second_session_blocks_until_first_drops() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);
        let first = SpoolLock::acquire(&lock_path).unwrap();

        let (tx, rx) = mpsc::channel();
        let path = lock_path.clone();
        let waiter = std::thread::spawn(move || {
            let _second = SpoolLock::acquire(&path).unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(first);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        waiter.join().unwrap();
    }

    #[test]
    fn layout_is_created_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::new(dir.path().join("spool"));
        spool.ensure_layout().unwrap();
        spool.ensure_layout().unwrap();
        assert!(spool.requests_dir().is_dir());
        assert!(spool.archive_dir().is_dir());
        assert_eq!(spool.request_dir(5), spool.root().join("requests/5"));
    }
}
