//! `nodemaint-core` — shared configuration, errors and vocabulary for the
//! node maintenance scheduler.

pub mod config;
pub mod error;
pub mod types;

pub use config::NodeMaintConfig;
pub use error::{NodeMaintError, Result};
pub use types::NodeId;
