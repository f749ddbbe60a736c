//! Job tracking error types.

use broker_core::JobMethod;
use thiserror::Error;

use crate::message::JobMsg;

/// Errors surfaced to callers of the job tracking subsystem.
///
/// Subscriber tasks never return these; they log and move on.
#[derive(Debug, Error)]
pub enum JobError {
    /// The channel for this method has been closed; the message is handed
    /// back undelivered.
    #[error("{method} bus is closed")]
    BusClosed { method: JobMethod, msg: Box<JobMsg> },

    /// The channel for this method is at capacity; the message is handed
    /// back undelivered.
    #[error("{method} bus is full")]
    BusFull { method: JobMethod, msg: Box<JobMsg> },
}

pub type JobResult<T> = Result<T, JobError>;
