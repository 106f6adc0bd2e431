//! Marker snapshot and the pure projection from markers to [`RequestState`].
//!
//! Nothing here is cached: every query re-reads the request directory, so a
//! restarted process (or an operator deleting a directory by hand) is seen
//! immediately.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use nodemaint_core::types::exit;

use crate::types::RequestState;

/// Attempts allowed to end in TEMPFAIL before the request escalates.
pub const RETRY_LIMIT: u32 = 48;

/// Marker file names inside a request directory.
pub mod markers {
    pub const DATA: &str = "data";
    pub const STARTED: &str = "started";
    pub const STOPPED: &str = "stopped";
    pub const EXITCODE: &str = "exitcode";
    pub const ATTEMPT: &str = "attempt";
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
}

/// Everything the state machine looks at, read once from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers {
    pub data: bool,
    pub started: bool,
    pub stopped: bool,
    /// Parsed `started` timestamp; `None` if absent or unreadable.
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Last line of `exitcode`.
    pub exit_code: Option<i32>,
    pub attempts: u32,
}

impl Markers {
    /// Snapshot the markers of the request directory `dir`.
    ///
    /// A missing directory yields the empty snapshot, i.e. `DELETED`.
    pub fn read(dir: &Path) -> Self {
        Self {
            data: dir.join(markers::DATA).is_file(),
            started: dir.join(markers::STARTED).exists(),
            stopped: dir.join(markers::STOPPED).exists(),
            started_at: read_timestamp(&dir.join(markers::STARTED)),
            stopped_at: read_timestamp(&dir.join(markers::STOPPED)),
            exit_code: read_last_exit_code(&dir.join(markers::EXITCODE)),
            attempts: read_attempts(&dir.join(markers::ATTEMPT)),
        }
    }

    /// Project the snapshot onto a lifecycle state.
    pub fn state(&self, starttime: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RequestState {
        if !self.data {
            return RequestState::Deleted;
        }
        match (self.started, self.stopped) {
            (true, false) => RequestState::Running,
            (false, false) => match starttime {
                Some(at) if at <= now => RequestState::Due,
                _ => RequestState::Pending,
            },
            _ => match self.exit_code {
                Some(exit::SUCCESS) => RequestState::Success,
                Some(exit::POSTPONE) => RequestState::Postpone,
                Some(exit::TEMPFAIL) if self.attempts > RETRY_LIMIT => RequestState::Retrylimit,
                Some(exit::TEMPFAIL) => RequestState::Tempfail,
                _ => RequestState::Error,
            },
        }
    }

    /// `stopped - started` in whole seconds, when both are readable.
    pub fn duration(&self) -> Option<i64> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some((stop - start).num_seconds()),
            _ => None,
        }
    }
}

pub(crate) fn read_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let raw = fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn read_attempts(path: &Path) -> u32 {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
}

/// Only the last non-empty line counts; earlier lines are history.
fn read_last_exit_code(path: &Path) -> Option<i32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn finished(exit_code: Option<i32>, attempts: u32) -> Markers {
        Markers {
            data: true,
            started: true,
            stopped: true,
            exit_code,
            attempts,
            ..Markers::default()
        }
    }

    #[test]
    fn no_data_is_deleted_whatever_else_exists() {
        let m = Markers {
            data: false,
            started: true,
            stopped: true,
            exit_code: Some(0),
            ..Markers::default()
        };
        assert_eq!(m.state(None, Utc::now()), RequestState::Deleted);
    }

    #[test]
    fn started_without_stopped_is_running() {
        let m = Markers {
            data: true,
            started: true,
            ..Markers::default()
        };
        assert_eq!(m.state(None, Utc::now()), RequestState::Running);
    }

    #[test]
    fn unattempted_depends_on_starttime() {
        let now = Utc::now();
        let m = Markers {
            data: true,
            ..Markers::default()
        };
        assert_eq!(m.state(None, now), RequestState::Pending);
        assert_eq!(m.state(Some(now + Duration::hours(1)), now), RequestState::Pending);
        assert_eq!(m.state(Some(now - Duration::seconds(1)), now), RequestState::Due);
        assert_eq!(m.state(Some(now), now), RequestState::Due);
    }

    #[test]
    fn finished_attempts_classified_by_exit_code() {
        let now = Utc::now();
        assert_eq!(finished(Some(0), 1).state(None, now), RequestState::Success);
        assert_eq!(finished(Some(69), 1).state(None, now), RequestState::Postpone);
        assert_eq!(finished(Some(75), 1).state(None, now), RequestState::Tempfail);
        assert_eq!(finished(Some(2), 1).state(None, now), RequestState::Error);
        assert_eq!(finished(Some(-1), 1).state(None, now), RequestState::Error);
        assert_eq!(finished(None, 1).state(None, now), RequestState::Error);
    }

    #[test]
    fn retry_ceiling_is_exclusive() {
        let now = Utc::now();
        assert_eq!(finished(Some(75), RETRY_LIMIT).state(None, now), RequestState::Tempfail);
        assert_eq!(
            finished(Some(75), RETRY_LIMIT + 1).state(None, now),
            RequestState::Retrylimit
        );
    }

    #[test]
    fn read_uses_last_exit_code_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(markers::DATA), "{}").unwrap();
        fs::write(dir.path().join(markers::STARTED), Utc::now().to_rfc3339()).unwrap();
        fs::write(dir.path().join(markers::STOPPED), Utc::now().to_rfc3339()).unwrap();
        fs::write(dir.path().join(markers::EXITCODE), "75\n75\n0\n").unwrap();
        fs::write(dir.path().join(markers::ATTEMPT), "3\n").unwrap();

        let m = Markers::read(dir.path());
        assert_eq!(m.exit_code, Some(0));
        assert_eq!(m.attempts, 3);
        assert_eq!(m.state(None, Utc::now()), RequestState::Success);
    }

    #[test]
    fn missing_directory_reads_as_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let m = Markers::read(&dir.path().join("42"));
        assert_eq!(m, Markers::default());
        assert_eq!(m.state(None, Utc::now()), RequestState::Deleted);
    }

    #[test]
    fn duration_is_stop_minus_start() {
        let start = Utc::now();
        let m = Markers {
            started_at: Some(start),
            stopped_at: Some(start + Duration::seconds(90)),
            ..Markers::default()
        };
        assert_eq!(m.duration(), Some(90));
        assert_eq!(Markers::default().duration(), None);
    }
}
