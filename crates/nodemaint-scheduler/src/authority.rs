use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodemaint_core::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RequestState;

/// What the directory is told about each active request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Seconds.
    pub estimate: i64,
    pub comment: String,
}

/// The directory's answer for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledStart {
    /// `None` means "known, but not scheduled yet".
    pub starttime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostponeEntry {
    /// Seconds to push the window back by.
    pub postpone_by: i64,
}

/// Final report for a request leaving the active spool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndEntry {
    /// `stopped - started` in seconds; `None` if it never ran.
    pub duration: Option<i64>,
    pub result: RequestState,
}

/// Maps keyed by request uuid, ordered so wire payloads are deterministic.
pub type ScheduleRequest = BTreeMap<String, ScheduleEntry>;
pub type ScheduleReply = BTreeMap<String, ScheduledStart>;
pub type PostponeRequest = BTreeMap<String, PostponeEntry>;
pub type EndRequest = BTreeMap<String, EndEntry>;

#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The directory could not be reached (connect error, timeout).
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with a non-success status.
    #[error("directory error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not decode.
    #[error("malformed directory response: {0}")]
    Parse(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The fleet directory: owner of the canonical maintenance schedule.
///
/// Every call is keyed by request uuid. Implementations must not retry
/// internally; a failed call aborts the current cycle and the next cycle
/// tries again from disk state.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Announce every active request and receive its start time.
    async fn schedule_maintenance(
        &self,
        requests: &ScheduleRequest,
    ) -> Result<ScheduleReply, AuthorityError>;

    async fn postpone_maintenance(&self, requests: &PostponeRequest) -> Result<(), AuthorityError>;

    async fn end_maintenance(&self, requests: &EndRequest) -> Result<(), AuthorityError>;

    async fn mark_node_service_status(
        &self,
        node: &NodeId,
        in_service: bool,
    ) -> Result<(), AuthorityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_entry_wire_shape() {
        let entry = EndEntry {
            duration: Some(42),
            result: RequestState::Success,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"duration": 42, "result": "SUCCESS"}));
    }

    #[test]
    fn unscheduled_start_decodes_from_null() {
        let reply: ScheduleReply =
            serde_json::from_str(r#"{"abc": {"starttime": null}}"#).unwrap();
        assert_eq!(reply["abc"].starttime, None);
    }
}
