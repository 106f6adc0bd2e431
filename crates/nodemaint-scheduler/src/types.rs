use serde::{Deserialize, Serialize};

/// Lifecycle state of a request, always derived from its marker files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestState {
    /// Directory or `data` file is gone.
    Deleted,
    /// `started` written, `stopped` not yet.
    Running,
    /// Never attempted and no start time has been handed out yet.
    Pending,
    /// Never attempted and its start time has passed.
    Due,
    /// Last attempt exited 0.
    Success,
    /// Last attempt exited 69; waiting to be rescheduled.
    Postpone,
    /// Last attempt exited 75 and the retry budget is not exhausted.
    Tempfail,
    /// Last attempt exited 75 after too many attempts.
    Retrylimit,
    /// Any other outcome.
    Error,
}

impl RequestState {
    /// States that `archive_requests` moves out of the active spool.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Success
                | RequestState::Error
                | RequestState::Retrylimit
                | RequestState::Deleted
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::Deleted => "DELETED",
            RequestState::Running => "RUNNING",
            RequestState::Pending => "PENDING",
            RequestState::Due => "DUE",
            RequestState::Success => "SUCCESS",
            RequestState::Postpone => "POSTPONE",
            RequestState::Tempfail => "TEMPFAIL",
            RequestState::Retrylimit => "RETRYLIMIT",
            RequestState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RequestState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DELETED" => Ok(RequestState::Deleted),
            "RUNNING" => Ok(RequestState::Running),
            "PENDING" => Ok(RequestState::Pending),
            "DUE" => Ok(RequestState::Due),
            "SUCCESS" => Ok(RequestState::Success),
            "POSTPONE" => Ok(RequestState::Postpone),
            "TEMPFAIL" => Ok(RequestState::Tempfail),
            "RETRYLIMIT" => Ok(RequestState::Retrylimit),
            "ERROR" => Ok(RequestState::Error),
            other => Err(format!("unknown request state: {other}")),
        }
    }
}

/// Caller-supplied parameters for a new (or de-duplicated) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Expected duration in seconds; must be positive.
    pub estimate: i64,
    pub script: Option<String>,
    /// Human description; also the de-duplication key.
    pub comment: String,
    pub applicable: Option<String>,
    /// Correlation id; a random UUID is assigned when absent.
    pub uuid: Option<String>,
}

impl RequestSpec {
    pub fn new(estimate: i64, comment: impl Into<String>) -> Self {
        Self {
            estimate,
            script: None,
            comment: comment.into(),
            applicable: None,
            uuid: None,
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_applicable(mut self, applicable: impl Into<String>) -> Self {
        self.applicable = Some(applicable.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }
}

/// How one `execute_requests` pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CycleOutcome {
    /// Nothing was runnable; the node's service flag was not touched.
    Idle,
    /// The prepare set failed; no request ran and the node stays out of service.
    PrepareFailed { exit_code: i32 },
    /// A request hit a transient failure; the rest of the queue waits.
    TempFailed { reqid: u64, executed: Vec<u64> },
    /// All runnable requests ran but the finish set failed.
    FinishFailed { exit_code: i32, executed: Vec<u64> },
    /// All runnable requests ran and the node is back in service.
    Completed { executed: Vec<u64> },
}

/// Result of reconciling with the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSync {
    /// Requests whose start time changed.
    pub updated: Vec<u64>,
    /// Requests the directory no longer knows; reported as deleted.
    pub forgotten: Vec<u64>,
}

/// Everything one `run_cycle` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub sync: ScheduleSync,
    pub outcome: CycleOutcome,
    pub postponed: Vec<u64>,
    pub archived: Vec<u64>,
}
