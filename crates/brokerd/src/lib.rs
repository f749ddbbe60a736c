//! brokerd — the broker daemon.
//!
//! Assembles the job tracking subsystem around one redb-backed state store:
//! - startup recovery scan (and reconcile)
//! - work engine: message bus + one subscriber per job method
//! - periodic recovery loop
//!
//! Executors publish on the bus handle from [`Daemon::bus`].

pub mod daemon;
pub mod jobs;
pub mod logging;

pub use daemon::{Daemon, apply_overrides, open_dao};
