use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use nodemaint_core::{NodeId, NodeMaintConfig};
use nodemaint_hooks::{run_snippet_set, SnippetPhase};
use tracing::{debug, error, info, warn};

use crate::{
    authority::{
        Authority, EndEntry, EndRequest, PostponeEntry, PostponeRequest, ScheduleEntry,
        ScheduleRequest,
    },
    error::{Result, SchedulerError},
    request::Request,
    spool::{allocate_reqid, Spool, SpoolLock},
    types::{CycleOutcome, CycleReport, RequestSpec, RequestState, ScheduleSync},
};

/// Where the prepare/finish snippet sets live.
#[derive(Debug, Clone)]
pub struct SnippetDirs {
    pub prepare: PathBuf,
    pub finish: PathBuf,
}

/// A scheduler session over one spool.
///
/// The spool lock is taken on the first call that touches the spool and held
/// until [`close`](RequestScheduler::close) or drop. Nothing about requests is
/// cached between calls: every operation rescans the spool.
pub struct RequestScheduler {
    spool: Spool,
    node: NodeId,
    snippets: SnippetDirs,
    authority: Arc<dyn Authority>,
    lock: Option<SpoolLock>,
}

impl RequestScheduler {
    pub fn new(
        spool_root: impl Into<PathBuf>,
        node: NodeId,
        snippets: SnippetDirs,
        authority: Arc<dyn Authority>,
    ) -> Self {
        Self {
            spool: Spool::new(spool_root),
            node,
            snippets,
            authority,
            lock: None,
        }
    }

    pub fn from_config(config: &NodeMaintConfig, authority: Arc<dyn Authority>) -> Self {
        Self::new(
            config.spool.path.clone(),
            config.node.node_id(),
            SnippetDirs {
                prepare: config.snippets.prepare_dir.clone(),
                finish: config.snippets.finish_dir.clone(),
            },
            authority,
        )
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Whether this session currently holds the spool lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// End the session, releasing the spool lock.
    pub fn close(mut self) {
        if self.lock.take().is_some() {
            info!(spool = %self.spool.root().display(), "scheduler session closed");
        }
    }

    fn session(&mut self) -> Result<()> {
        if self.lock.is_none() {
            let lock = SpoolLock::acquire(&self.spool.lock_path())?;
            self.spool.ensure_layout()?;
            info!(spool = %self.spool.root().display(), node = %self.node, "scheduler session opened");
            self.lock = Some(lock);
        }
        Ok(())
    }

    // --- queries ---------------------------------------------------------------

    /// Active requests, ascending by reqid.
    pub fn requests(&mut self) -> Result<Vec<Request>> {
        self.session()?;
        Ok(scan(&self.spool.requests_dir())?.requests)
    }

    /// Archived requests, ascending by reqid.
    pub fn archived_requests(&mut self) -> Result<Vec<Request>> {
        self.session()?;
        Ok(scan(&self.spool.archive_dir())?.requests)
    }

    /// Look a request up by ID, active spool first, then the archive.
    pub fn request(&mut self, reqid: u64) -> Result<Request> {
        self.session()?;
        for dir in [self.spool.request_dir(reqid), self.spool.archived_dir(reqid)] {
            if let Some(request) = Request::load(&dir)? {
                return Ok(request);
            }
        }
        Err(SchedulerError::RequestNotFound { reqid })
    }

    // --- queueing --------------------------------------------------------------

    /// Add a request, or update the active one carrying the same comment.
    ///
    /// The comment is the idempotency key: the directory may hand out the
    /// same activity on every reconciliation, and only the first call creates
    /// a directory. On a match, estimate, script and applicable are replaced;
    /// uuid and start time stay as they were.
    pub fn add_request(&mut self, spec: RequestSpec) -> Result<Request> {
        if spec.estimate <= 0 {
            return Err(SchedulerError::InvalidEstimate {
                estimate: spec.estimate,
            });
        }
        self.session()?;

        let active = scan(&self.spool.requests_dir())?.requests;
        if let Some(mut existing) = active.into_iter().find(|r| r.comment() == spec.comment) {
            existing.update(spec.estimate, spec.script, spec.applicable)?;
            info!(
                reqid = existing.reqid(),
                comment = %existing.comment(),
                estimate = existing.estimate(),
                "updated existing request"
            );
            return Ok(existing);
        }

        let reqid = allocate_reqid(&self.spool.seq_path())?;
        let request = Request::new(self.spool.request_dir(reqid), reqid, spec)?;
        fs::create_dir(request.path())?;
        request.save()?;
        info!(
            reqid,
            uuid = %request.short_uuid(),
            comment = %request.comment(),
            "request added"
        );
        Ok(request)
    }

    /// Requests to run this cycle: RUNNING (by reqid), then TEMPFAIL, then
    /// DUE (each by start time).
    ///
    /// The sequence is lazy: each group is read from disk only once the
    /// previous one is exhausted, so it reflects what earlier executions did.
    pub fn runnable_requests(&mut self) -> Result<RunnableRequests> {
        self.session()?;
        Ok(RunnableRequests::new(self.spool.requests_dir()))
    }

    // --- execution -------------------------------------------------------------

    /// Run every runnable request, one at a time, inside a maintenance window.
    pub async fn execute_requests(&mut self) -> Result<CycleOutcome> {
        let mut queue = self.runnable_requests()?;
        let first = match queue.next() {
            None => {
                debug!("nothing runnable");
                return Ok(CycleOutcome::Idle);
            }
            Some(first) => first?,
        };

        info!(node = %self.node, "taking node out of service");
        self.authority
            .mark_node_service_status(&self.node, false)
            .await?;

        let prepare = run_snippet_set(SnippetPhase::Prepare, &self.snippets.prepare).await?;
        if !prepare.success() {
            error!(
                exit_code = prepare.exit_code,
                "prepare failed, leaving node out of service and skipping this cycle"
            );
            return Ok(CycleOutcome::PrepareFailed {
                exit_code: prepare.exit_code,
            });
        }

        let mut executed = Vec::new();
        for request in std::iter::once(Ok(first)).chain(queue) {
            let request = request?;
            info!(
                reqid = request.reqid(),
                uuid = %request.short_uuid(),
                comment = %request.comment(),
                "executing request"
            );
            let state = request.execute().await?;
            executed.push(request.reqid());

            match state {
                RequestState::Tempfail => {
                    warn!(
                        reqid = request.reqid(),
                        attempts = request.attempts(),
                        "transient failure, deferring the rest of the queue"
                    );
                    return Ok(CycleOutcome::TempFailed {
                        reqid: request.reqid(),
                        executed,
                    });
                }
                RequestState::Error | RequestState::Retrylimit => {
                    error!(
                        reqid = request.reqid(),
                        %state,
                        exit_code = ?request.last_exit_code(),
                        "request failed"
                    );
                }
                _ => {}
            }
        }

        // Flag flips before finish runs; a failing finish does not undo it.
        info!(node = %self.node, "returning node to service");
        self.authority
            .mark_node_service_status(&self.node, true)
            .await?;

        let finish = run_snippet_set(SnippetPhase::Finish, &self.snippets.finish).await?;
        if !finish.success() {
            error!(exit_code = finish.exit_code, "finish failed");
            return Ok(CycleOutcome::FinishFailed {
                exit_code: finish.exit_code,
                executed,
            });
        }

        Ok(CycleOutcome::Completed { executed })
    }

    /// Hand every POSTPONE request back to the directory for a new slot.
    pub async fn postpone_requests(&mut self) -> Result<Vec<u64>> {
        self.session()?;
        let now = Utc::now();
        let mut postponed: Vec<Request> = scan(&self.spool.requests_dir())?
            .requests
            .into_iter()
            .filter(|r| r.state_at(now) == RequestState::Postpone)
            .collect();
        if postponed.is_empty() {
            return Ok(Vec::new());
        }

        let payload: PostponeRequest = postponed
            .iter()
            .map(|r| {
                (
                    r.uuid().to_string(),
                    PostponeEntry {
                        postpone_by: r.estimate(),
                    },
                )
            })
            .collect();
        self.authority.postpone_maintenance(&payload).await?;

        let mut ids = Vec::with_capacity(postponed.len());
        for request in &mut postponed {
            request.reset_for_reschedule()?;
            info!(reqid = request.reqid(), postpone_by = request.estimate(), "request postponed");
            ids.push(request.reqid());
        }
        Ok(ids)
    }

    /// Reconcile start times with the directory.
    ///
    /// Requests the directory no longer returns are reported as DELETED. Their
    /// directories stay in the spool: only a missing `data` file makes a
    /// request DELETED on disk, so they are reported again next cycle until an
    /// operator removes them.
    pub async fn update_schedule(&mut self) -> Result<ScheduleSync> {
        self.session()?;
        let mut active = scan(&self.spool.requests_dir())?.requests;
        if active.is_empty() {
            return Ok(ScheduleSync::default());
        }

        let payload: ScheduleRequest = active
            .iter()
            .map(|r| {
                (
                    r.uuid().to_string(),
                    ScheduleEntry {
                        estimate: r.estimate(),
                        comment: r.comment().to_string(),
                    },
                )
            })
            .collect();
        let reply = self.authority.schedule_maintenance(&payload).await?;

        let mut sync = ScheduleSync::default();
        let mut gone = EndRequest::new();
        for request in &mut active {
            match reply.get(request.uuid()) {
                Some(slot) if slot.starttime != request.starttime() => {
                    info!(
                        reqid = request.reqid(),
                        from = ?request.starttime(),
                        to = ?slot.starttime,
                        "start time changed"
                    );
                    request.set_starttime(slot.starttime)?;
                    sync.updated.push(request.reqid());
                }
                Some(_) => {}
                None => {
                    warn!(
                        reqid = request.reqid(),
                        uuid = %request.uuid(),
                        "directory no longer knows this request, reporting it deleted"
                    );
                    gone.insert(
                        request.uuid().to_string(),
                        EndEntry {
                            duration: None,
                            result: RequestState::Deleted,
                        },
                    );
                    sync.forgotten.push(request.reqid());
                }
            }
        }

        for uuid in reply.keys().filter(|u| !payload.contains_key(*u)) {
            debug!(%uuid, "ignoring unknown uuid in schedule reply");
        }

        if !gone.is_empty() {
            self.authority.end_maintenance(&gone).await?;
        }
        Ok(sync)
    }

    /// Report and move every finished request into `archive/`.
    pub async fn archive_requests(&mut self) -> Result<Vec<u64>> {
        self.session()?;
        let scan = scan(&self.spool.requests_dir())?;
        let now = Utc::now();

        let mut finished = Vec::new();
        let mut report = EndRequest::new();
        for request in scan.requests {
            let markers = request.markers();
            let state = markers.state(request.starttime(), now);
            if !state.is_terminal() {
                continue;
            }
            report.insert(
                request.uuid().to_string(),
                EndEntry {
                    duration: markers.duration(),
                    result: state,
                },
            );
            finished.push((request.reqid(), request.path().to_path_buf(), state));
        }

        if !report.is_empty() {
            self.authority.end_maintenance(&report).await?;
        }

        // A failed move leaves the request active; it is reported and moved
        // again next cycle.
        let mut archived = Vec::with_capacity(finished.len() + scan.orphans.len());
        for (reqid, path, state) in finished {
            match self.move_to_archive(reqid, &path) {
                Ok(()) => {
                    info!(reqid, %state, "request archived");
                    archived.push(reqid);
                }
                Err(e) => error!(reqid, error = %e, "cannot move request to archive"),
            }
        }
        // No data file means no uuid to report; keep the leftovers for audit.
        for (reqid, path) in scan.orphans {
            match self.move_to_archive(reqid, &path) {
                Ok(()) => {
                    warn!(reqid, "archived request directory without data");
                    archived.push(reqid);
                }
                Err(e) => error!(reqid, error = %e, "cannot move request to archive"),
            }
        }
        Ok(archived)
    }

    fn move_to_archive(&self, reqid: u64, path: &Path) -> std::io::Result<()> {
        fs::rename(path, self.spool.archived_dir(reqid))
    }

    /// One full invocation: reconcile, execute, postpone, archive.
    ///
    /// A directory failure while reconciling aborts before anything runs.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let sync = self.update_schedule().await?;
        let outcome = self.execute_requests().await?;
        let postponed = self.postpone_requests().await?;
        let archived = self.archive_requests().await?;

        info!(
            updated = sync.updated.len(),
            forgotten = sync.forgotten.len(),
            outcome = ?outcome,
            postponed = postponed.len(),
            archived = archived.len(),
            authority = self.authority.name(),
            "cycle finished"
        );

        Ok(CycleReport {
            sync,
            outcome,
            postponed,
            archived,
        })
    }
}

// ---------------------------------------------------------------------------
// Runnable ordering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Tempfail,
    Due,
    Done,
}

/// One-shot iterator returned by [`RequestScheduler::runnable_requests`].
pub struct RunnableRequests {
    dir: PathBuf,
    phase: Phase,
    queue: VecDeque<Request>,
}

impl RunnableRequests {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            phase: Phase::Running,
            queue: VecDeque::new(),
        }
    }
}

impl Iterator for RunnableRequests {
    type Item = Result<Request>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(request) = self.queue.pop_front() {
                return Some(Ok(request));
            }

            let (wanted, following) = match self.phase {
                Phase::Running => (RequestState::Running, Phase::Tempfail),
                Phase::Tempfail => (RequestState::Tempfail, Phase::Due),
                Phase::Due => (RequestState::Due, Phase::Done),
                Phase::Done => return None,
            };
            self.phase = following;

            let requests = match scan(&self.dir) {
                Ok(scan) => scan.requests,
                Err(e) => {
                    self.phase = Phase::Done;
                    return Some(Err(e));
                }
            };
            let now = Utc::now();
            let mut picked: Vec<Request> = requests
                .into_iter()
                .filter(|r| r.state_at(now) == wanted)
                .collect();
            if wanted != RequestState::Running {
                // Stable sort: equal start times keep reqid order.
                picked.sort_by_key(|r| r.starttime());
            }
            self.queue.extend(picked);
        }
    }
}

// ---------------------------------------------------------------------------
// Spool scanning
// ---------------------------------------------------------------------------

struct Scan {
    /// Loadable requests, ascending by reqid.
    requests: Vec<Request>,
    /// Numeric directories without a `data` file.
    orphans: Vec<(u64, PathBuf)>,
}

fn scan(dir: &Path) -> Result<Scan> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Scan {
                requests: Vec::new(),
                orphans: Vec::new(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut dirs: Vec<(u64, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let reqid = entry.file_name().to_str()?.parse::<u64>().ok()?;
            Some((reqid, entry.path()))
        })
        .collect();
    dirs.sort_by_key(|(reqid, _)| *reqid);

    let mut requests = Vec::with_capacity(dirs.len());
    let mut orphans = Vec::new();
    for (reqid, path) in dirs {
        match Request::load(&path) {
            Ok(Some(request)) => requests.push(request),
            Ok(None) => orphans.push((reqid, path)),
            Err(e) => error!(reqid, error = %e, "unreadable request data, skipping"),
        }
    }
    Ok(Scan { requests, orphans })
}
