//! broker-jobs — job message dispatch and state tracking.
//!
//! Workload executors report progress as [`JobMsg`]s. Each message is
//! routed by its job method onto one channel of the [`MessageBus`]; one
//! subscriber task per method consumes that channel in order, persists the
//! reported [`JobState`](broker_core::JobState), and runs the method's
//! compensating action on success.
//!
//! # Architecture
//!
//! ```text
//! executors ──publish──▶ MessageBus ─┬─ provision   ─▶ ProvisionWorkSubscriber
//!                                    ├─ deprovision ─▶ DeprovisionWorkSubscriber
//!                                    ├─ bind        ─▶ BindWorkSubscriber
//!                                    ├─ unbind      ─▶ UnbindWorkSubscriber
//!                                    └─ update      ─▶ UpdateWorkSubscriber
//!                                                          │
//!                                                          ▼
//!                                                   SubscriberDao (state store)
//!
//! RecoveryScanner ── find_by_state ──▶ JobTracker::reattach
//! ```
//!
//! # Failure handling
//!
//! Subscribers never retry and never stop on a store error. A failed state
//! write drops that message's processing; a failed cleanup after a
//! successful deprovision/unbind demotes the job to `Failed`. Resilience
//! against transient store failures comes from the recovery scan.

pub mod bus;
pub mod dao;
pub mod engine;
pub mod error;
pub mod message;
pub mod recovery;
pub mod subscriber;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{BusReceivers, MessageBus};
pub use dao::SubscriberDao;
pub use engine::WorkEngine;
pub use error::{JobError, JobResult};
pub use message::JobMsg;
pub use recovery::{JobTracker, LoggingTracker, ReconcileReport, RecoveryReport, RecoveryScanner};
pub use subscriber::{
    BindWorkSubscriber, DeprovisionWorkSubscriber, MessageOutcome, ProvisionWorkSubscriber,
    SubscriberStats, UnbindWorkSubscriber, UpdateWorkSubscriber, WorkSubscriber,
};
