use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nodemaint_core::types::exit;
use nodemaint_terminal::{excerpt, exec, ExecOptions, Invocation, TerminalError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SchedulerError},
    state::{markers, read_attempts, Markers},
    types::{RequestSpec, RequestState},
};

/// The declared parameters of a request: exactly what lives in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub reqid: u64,
    pub uuid: String,
    /// Expected duration in seconds.
    pub estimate: i64,
    pub script: Option<String>,
    pub comment: String,
    pub applicable: Option<String>,
    /// When the directory wants this to run; `None` until scheduled.
    pub starttime: Option<DateTime<Utc>>,
}

/// One maintenance activity and its spool directory.
///
/// The struct only carries the declared parameters. Lifecycle state is read
/// from the directory on every call to [`Request::state`].
#[derive(Debug, Clone)]
pub struct Request {
    data: RequestData,
    path: PathBuf,
}

/// Flattened view of a request for display and `show` output.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    #[serde(flatten)]
    pub data: RequestData,
    pub state: RequestState,
    pub attempts: u32,
    pub last_exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub path: PathBuf,
}

impl Request {
    /// Build a request rooted at `path`. Nothing is written until [`save`].
    ///
    /// Fails with `InvalidEstimate` when `spec.estimate <= 0`.
    ///
    /// [`save`]: Request::save
    pub fn new(path: impl Into<PathBuf>, reqid: u64, spec: RequestSpec) -> Result<Self> {
        validate_estimate(spec.estimate)?;
        Ok(Self {
            data: RequestData {
                reqid,
                uuid: spec.uuid.unwrap_or_else(|| Uuid::new_v4().to_string()),
                estimate: spec.estimate,
                script: spec.script,
                comment: spec.comment,
                applicable: spec.applicable,
                starttime: None,
            },
            path: path.into(),
        })
    }

    /// Load the request persisted in `dir`; `Ok(None)` when there is no `data`.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let raw = match fs::read(dir.join(markers::DATA)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data: RequestData = serde_json::from_slice(&raw)?;
        Ok(Some(Self {
            data,
            path: dir.to_path_buf(),
        }))
    }

    /// Persist `data` atomically (write temp file, then rename over).
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        let tmp = self.path.join(".data.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.data)?)?;
        fs::rename(&tmp, self.path.join(markers::DATA))?;
        Ok(())
    }

    // --- declared parameters -------------------------------------------------

    pub fn reqid(&self) -> u64 {
        self.data.reqid
    }

    pub fn uuid(&self) -> &str {
        &self.data.uuid
    }

    /// First eight characters of the uuid, for log lines and listings.
    pub fn short_uuid(&self) -> String {
        self.data.uuid.chars().take(8).collect()
    }

    pub fn estimate(&self) -> i64 {
        self.data.estimate
    }

    pub fn script(&self) -> Option<&str> {
        self.data.script.as_deref()
    }

    pub fn comment(&self) -> &str {
        &self.data.comment
    }

    pub fn applicable(&self) -> Option<&str> {
        self.data.applicable.as_deref()
    }

    pub fn starttime(&self) -> Option<DateTime<Utc>> {
        self.data.starttime
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &RequestData {
        &self.data
    }

    // --- derived state -------------------------------------------------------

    pub fn markers(&self) -> Markers {
        Markers::read(&self.path)
    }

    pub fn state(&self) -> RequestState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> RequestState {
        self.markers().state(self.data.starttime, now)
    }

    pub fn attempts(&self) -> u32 {
        self.markers().attempts
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.markers().exit_code
    }

    /// Seconds between `started` and `stopped` of the latest attempt.
    pub fn duration(&self) -> Option<i64> {
        self.markers().duration()
    }

    pub fn summary(&self) -> RequestSummary {
        let m = self.markers();
        RequestSummary {
            data: self.data.clone(),
            state: m.state(self.data.starttime, Utc::now()),
            attempts: m.attempts,
            last_exit_code: m.exit_code,
            started_at: m.started_at,
            stopped_at: m.stopped_at,
            duration: m.duration(),
            path: self.path.clone(),
        }
    }

    // --- mutation ------------------------------------------------------------

    /// Replace the runnable parameters in place (comment and uuid are kept).
    pub fn update(
        &mut self,
        estimate: i64,
        script: Option<String>,
        applicable: Option<String>,
    ) -> Result<()> {
        validate_estimate(estimate)?;
        self.data.estimate = estimate;
        self.data.script = script;
        self.data.applicable = applicable;
        self.save()
    }

    pub fn set_starttime(&mut self, starttime: Option<DateTime<Utc>>) -> Result<()> {
        self.data.starttime = starttime;
        self.save()
    }

    /// Return a postponed request to PENDING until a new start time arrives.
    ///
    /// `attempt`, `exitcode` and captured output are kept as history.
    pub fn reset_for_reschedule(&mut self) -> Result<()> {
        remove_marker(&self.path.join(markers::STARTED))?;
        remove_marker(&self.path.join(markers::STOPPED))?;
        self.set_starttime(None)
    }

    // --- execution -----------------------------------------------------------

    /// Make one attempt and return the state it left behind.
    ///
    /// `started` is only written when absent, so resuming a request that was
    /// RUNNING when the previous process died keeps its original start.
    pub async fn execute(&self) -> Result<RequestState> {
        if !self.path.join(markers::DATA).is_file() {
            warn!(reqid = self.reqid(), "request vanished before execution");
            return Ok(RequestState::Deleted);
        }

        let started = self.path.join(markers::STARTED);
        if !started.exists() {
            fs::write(&started, Utc::now().to_rfc3339())?;
        }
        // A stale `stopped` from the previous attempt would hide RUNNING.
        remove_marker(&self.path.join(markers::STOPPED))?;

        let attempt = read_attempts(&self.path.join(markers::ATTEMPT)) + 1;
        fs::write(self.path.join(markers::ATTEMPT), format!("{attempt}\n"))?;
        info!(reqid = self.reqid(), uuid = %self.short_uuid(), attempt, "attempt started");

        let exit_code = self.run_attempt(attempt).await?;

        append_marker(
            &self.path.join(markers::EXITCODE),
            format!("{exit_code}\n").as_bytes(),
        )?;
        fs::write(self.path.join(markers::STOPPED), Utc::now().to_rfc3339())?;

        let state = self.state();
        info!(reqid = self.reqid(), exit_code, %state, "attempt finished");
        Ok(state)
    }

    async fn run_attempt(&self, attempt: u32) -> Result<i32> {
        if let Some(check) = self.data.applicable.as_deref() {
            match self.run_captured(check, attempt).await? {
                exit::SUCCESS => {}
                exit::NOT_APPLICABLE => {
                    info!(reqid = self.reqid(), "not applicable to this node, skipping script");
                    return Ok(exit::SUCCESS);
                }
                other => {
                    warn!(reqid = self.reqid(), exit_code = other, "applicability check failed");
                    return Ok(other);
                }
            }
        }

        match self.data.script.as_deref() {
            Some(script) => self.run_captured(script, attempt).await,
            None => Ok(exit::SUCCESS),
        }
    }

    /// Run `command` in the request directory, appending its output to the
    /// capture files. A spawn failure is recorded, not raised.
    async fn run_captured(&self, command: &str, attempt: u32) -> Result<i32> {
        let options = ExecOptions::in_dir(&self.path)
            .with_env("NODEMAINT_REQID", self.reqid().to_string())
            .with_env("NODEMAINT_UUID", self.uuid())
            .with_env("NODEMAINT_ATTEMPT", attempt.to_string());

        match exec(&Invocation::shell(command), &options).await {
            Ok(result) => {
                append_marker(&self.path.join(markers::STDOUT), &result.stdout)?;
                append_marker(&self.path.join(markers::STDERR), &result.stderr)?;
                if !result.success() {
                    debug!(
                        reqid = self.reqid(),
                        exit_code = result.exit_code,
                        stderr = %excerpt::tail(&result.stderr, excerpt::DEFAULT_TAIL_LINES),
                        "command exited nonzero"
                    );
                }
                Ok(result.exit_code)
            }
            Err(TerminalError::Spawn { source, .. }) => {
                warn!(reqid = self.reqid(), error = %source, "cannot spawn command");
                let line = format!("nodemaint: cannot spawn `{command}`: {source}\n");
                append_marker(&self.path.join(markers::STDERR), line.as_bytes())?;
                Ok(exit::SPAWN_FAILED)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_estimate(estimate: i64) -> Result<()> {
    if estimate <= 0 {
        return Err(SchedulerError::InvalidEstimate { estimate });
    }
    Ok(())
}

fn append_marker(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
