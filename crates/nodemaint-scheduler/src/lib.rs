//! `nodemaint-scheduler` — node-local maintenance request queue.
//!
//! # Overview
//!
//! Every request lives in its own directory under `<spool>/requests/<reqid>/`.
//! Its state is never stored: [`state::Markers`] reads the marker files and
//! projects them onto a [`RequestState`] on every query. The
//! [`engine::RequestScheduler`] holds the spool lock for a session and drives
//! one maintenance cycle against an [`authority::Authority`].
//!
//! # Marker files
//!
//! | File       | Meaning                                            |
//! |------------|----------------------------------------------------|
//! | `data`     | JSON [`request::RequestData`]; absent = DELETED    |
//! | `started`  | RFC 3339 time of the first unfinished attempt      |
//! | `stopped`  | RFC 3339 time the last attempt ended               |
//! | `exitcode` | One exit code per attempt; the last line counts    |
//! | `attempt`  | Number of attempts so far                          |
//! | `stdout`   | Appended output of every attempt                   |
//! | `stderr`   | Appended error output of every attempt             |
//!
//! # Cycle
//!
//! `update_schedule` → `execute_requests` → `postpone_requests` →
//! `archive_requests`, see [`RequestScheduler::run_cycle`].

pub mod authority;
pub mod engine;
pub mod error;
pub mod request;
pub mod spool;
pub mod state;
pub mod types;

pub use authority::{Authority, AuthorityError};
pub use engine::{RequestScheduler, RunnableRequests, SnippetDirs};
pub use error::{Result, SchedulerError};
pub use request::{Request, RequestData, RequestSummary};
pub use spool::Spool;
pub use state::{Markers, RETRY_LIMIT};
pub use types::{CycleOutcome, CycleReport, RequestSpec, RequestState, ScheduleSync};
