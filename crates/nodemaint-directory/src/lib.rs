//! `nodemaint-directory` — HTTP binding of the scheduler's [`Authority`].
//!
//! | Call                       | Endpoint                                          |
//! |----------------------------|---------------------------------------------------|
//! | `schedule_maintenance`     | `POST {base}/v1/nodes/{node}/maintenance/schedule` |
//! | `postpone_maintenance`     | `POST {base}/v1/nodes/{node}/maintenance/postpone` |
//! | `end_maintenance`          | `POST {base}/v1/nodes/{node}/maintenance/end`      |
//! | `mark_node_service_status` | `PUT  {base}/v1/nodes/{node}/service`              |
//!
//! [`Authority`]: nodemaint_scheduler::Authority

pub mod client;

pub use client::DirectoryClient;
