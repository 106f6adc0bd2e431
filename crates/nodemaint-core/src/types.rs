use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit-code taxonomy every maintenance script must honour.
///
/// These are the only signals the scheduler reads from a finished attempt.
pub mod exit {
    /// The attempt succeeded.
    pub const SUCCESS: i32 = 0;
    /// `applicable` check only: the request does not apply to this node.
    pub const NOT_APPLICABLE: i32 = 1;
    /// Try again later at a different time (sysexits `EX_UNAVAILABLE`).
    pub const POSTPONE: i32 = 69;
    /// Transient failure, retry next cycle (sysexits `EX_TEMPFAIL`).
    pub const TEMPFAIL: i32 = 75;
    /// Recorded when the command could not be spawned at all.
    pub const SPAWN_FAILED: i32 = 127;
}

/// Identifies this machine towards the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Best guess at the local node name: `$HOSTNAME`, else `localhost`.
    pub fn local() -> Self {
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .map(|h| Self(h.trim().to_string()))
            .unwrap_or_else(|| Self("localhost".to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
