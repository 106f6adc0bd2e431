// Shared fixtures for the scheduler integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodemaint_core::NodeId;
use nodemaint_scheduler::authority::{
    EndRequest, PostponeRequest, ScheduleReply, ScheduleRequest, ScheduledStart,
};
use nodemaint_scheduler::state::markers;
use nodemaint_scheduler::{Authority, AuthorityError, Request, RequestScheduler, SnippetDirs};
use tempfile::TempDir;

/// One call made against the fake directory.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Schedule(ScheduleRequest),
    Postpone(PostponeRequest),
    End(EndRequest),
    Service(bool),
}

/// In-memory directory that records every call.
///
/// Schedule replies echo every requested uuid except the forgotten ones,
/// with whatever start time was configured (none by default).
#[derive(Default)]
pub struct RecordingAuthority {
    calls: Mutex<Vec<Call>>,
    starts: Mutex<BTreeMap<String, DateTime<Utc>>>,
    forgotten: Mutex<BTreeSet<String>>,
    strangers: Mutex<BTreeMap<String, DateTime<Utc>>>,
    unavailable: AtomicBool,
}

impl RecordingAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn assign_start(&self, uuid: &str, at: DateTime<Utc>) {
        self.starts.lock().unwrap().insert(uuid.to_string(), at);
    }

    pub fn forget(&self, uuid: &str) {
        self.forgotten.lock().unwrap().insert(uuid.to_string());
    }

    /// Add a uuid this node never announced to every schedule reply.
    pub fn add_stranger(&self, uuid: &str, at: DateTime<Utc>) {
        self.strangers.lock().unwrap().insert(uuid.to_string(), at);
    }

    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn service_flips(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Service(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn end_reports(&self) -> Vec<EndRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::End(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), AuthorityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthorityError::Unavailable("connection refused".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl Authority for RecordingAuthority {
    fn name(&self) -> &str {
        "recording"
    }

    async fn schedule_maintenance(
        &self,
        requests: &ScheduleRequest,
    ) -> Result<ScheduleReply, AuthorityError> {
        self.record(Call::Schedule(requests.clone()))?;
        let starts = self.starts.lock().unwrap();
        let forgotten = self.forgotten.lock().unwrap();
        let strangers = self.strangers.lock().unwrap();
        let mut reply: ScheduleReply = requests
            .keys()
            .filter(|uuid| !forgotten.contains(*uuid))
            .map(|uuid| {
                (
                    uuid.clone(),
                    ScheduledStart {
                        starttime: starts.get(uuid).copied(),
                    },
                )
            })
            .collect();
        for (uuid, at) in strangers.iter() {
            reply.insert(uuid.clone(), ScheduledStart { starttime: Some(*at) });
        }
        Ok(reply)
    }

    async fn postpone_maintenance(&self, requests: &PostponeRequest) -> Result<(), AuthorityError> {
        self.record(Call::Postpone(requests.clone()))
    }

    async fn end_maintenance(&self, requests: &EndRequest) -> Result<(), AuthorityError> {
        self.record(Call::End(requests.clone()))
    }

    async fn mark_node_service_status(
        &self,
        _node: &NodeId,
        in_service: bool,
    ) -> Result<(), AuthorityError> {
        self.record(Call::Service(in_service))
    }
}

/// A temporary spool plus empty snippet directories.
pub struct Fixture {
    pub dir: TempDir,
    pub authority: Arc<RecordingAuthority>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("prepare.d")).unwrap();
        fs::create_dir_all(dir.path().join("finish.d")).unwrap();
        Self {
            dir,
            authority: RecordingAuthority::new(),
        }
    }

    pub fn spool_root(&self) -> PathBuf {
        self.dir.path().join("spool")
    }

    pub fn scheduler(&self) -> RequestScheduler {
        RequestScheduler::new(
            self.spool_root(),
            NodeId::new("node-a"),
            SnippetDirs {
                prepare: self.dir.path().join("prepare.d"),
                finish: self.dir.path().join("finish.d"),
            },
            self.authority.clone(),
        )
    }

    pub fn prepare_snippet(&self, name: &str, body: &str) {
        write_executable(&self.dir.path().join("prepare.d").join(name), body);
    }

    pub fn finish_snippet(&self, name: &str, body: &str) {
        write_executable(&self.dir.path().join("finish.d").join(name), body);
    }
}

pub fn write_executable(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Leave `request` looking like an attempt is in progress.
pub fn mark_running(request: &Request) {
    fs::write(request.path().join(markers::STARTED), Utc::now().to_rfc3339()).unwrap();
}

/// Leave `request` looking like `attempts` attempts ended, the last with `code`.
pub fn mark_finished(request: &Request, code: i32, attempts: u32) {
    let now = Utc::now().to_rfc3339();
    fs::write(request.path().join(markers::STARTED), &now).unwrap();
    fs::write(request.path().join(markers::STOPPED), &now).unwrap();
    fs::write(request.path().join(markers::EXITCODE), format!("{code}\n")).unwrap();
    fs::write(request.path().join(markers::ATTEMPT), format!("{attempts}\n")).unwrap();
}
