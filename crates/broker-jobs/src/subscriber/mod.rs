//! Work subscribers — one consumer per job method.
//!
//! Every subscriber follows the same per-message protocol:
//!
//! 1. Persist the reported job state. If that fails, log and drop the
//!    message.
//! 2. If the job succeeded, run the method's side effect (cleanup for
//!    deprovision/unbind, credential bookkeeping for provision/bind).
//! 3. If a deprovision/unbind cleanup fails, write the job again as
//!    `Failed` with a broker diagnostic. A failure of that write is only
//!    logged.
//!
//! A subscriber never retries and never stops on a store error.

mod bind;
mod deprovision;
mod provision;
mod unbind;
mod update;

pub use bind::BindWorkSubscriber;
pub use deprovision::DeprovisionWorkSubscriber;
pub use provision::ProvisionWorkSubscriber;
pub use unbind::UnbindWorkSubscriber;
pub use update::UpdateWorkSubscriber;

use std::fmt;
use std::sync::Arc;

use broker_core::JobMethod;
use broker_state::StateResult;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// What processing one message amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The state write failed; nothing else was attempted.
    NotRecorded,
    /// The state was persisted. No side effect ran, or a best-effort one
    /// failed.
    Recorded,
    /// The state was persisted and the success side effects completed.
    Completed,
    /// Cleanup failed and the job was rewritten as `Failed`.
    Demoted,
    /// Cleanup failed and so did the demotion write.
    DemotionLost,
}

/// A consumer of one method's bus channel.
pub trait WorkSubscriber: Send + Sync + 'static {
    fn method(&self) -> JobMethod;

    /// Apply one notification. Never fails; every error is logged and
    /// reflected in the outcome.
    fn handle(&self, msg: &JobMsg) -> MessageOutcome;
}

/// Per-subscriber counters, returned when its channel drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub processed: usize,
    pub not_recorded: usize,
    pub demoted: usize,
    pub demotion_lost: usize,
}

impl SubscriberStats {
    fn record(&mut self, outcome: MessageOutcome) {
        self.processed += 1;
        match outcome {
            MessageOutcome::NotRecorded => self.not_recorded += 1,
            MessageOutcome::Demoted => self.demoted += 1,
            MessageOutcome::DemotionLost => self.demotion_lost += 1,
            MessageOutcome::Recorded | MessageOutcome::Completed => {}
        }
    }
}

impl fmt::Display for SubscriberStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} not recorded, {} demoted, {} demotion lost",
            self.processed, self.not_recorded, self.demoted, self.demotion_lost
        )
    }
}

/// Spawn the consumer loop for `subscriber` on `rx`.
///
/// The task ends once the channel is closed and every buffered message has
/// been handled.
pub fn spawn<S>(subscriber: Arc<S>, mut rx: mpsc::Receiver<JobMsg>) -> JoinHandle<SubscriberStats>
where
    S: WorkSubscriber + ?Sized,
{
    tokio::spawn(async move {
        let method = subscriber.method();
        info!(%method, "work subscriber started");

        let mut stats = SubscriberStats::default();
        while let Some(msg) = rx.recv().await {
            if msg.method() != method {
                warn!(%method, token = %msg.state.token, got = %msg.method(), "message routed to the wrong subscriber");
            }
            let outcome = subscriber.handle(&msg);
            debug!(%method, token = %msg.state.token, ?outcome, "message handled");
            stats.record(outcome);
        }

        info!(%method, %stats, "work subscriber stopped");
        stats
    })
}

// ── Shared protocol steps ──────────────────────────────────────────

/// Persist the reported state. Returns false if the write failed.
fn record_state(dao: &dyn SubscriberDao, msg: &JobMsg) -> bool {
    match dao.set_state(&msg.instance_id, &msg.state) {
        Ok(_) => true,
        Err(e) => {
            error!(
                instance_id = %msg.instance_id,
                token = %msg.state.token,
                method = %msg.state.method,
                state = %msg.state.state,
                error = %e,
                "unable to record job state"
            );
            false
        }
    }
}

/// Rewrite the job as `Failed` after its cleanup failed with `cause`.
fn demote(dao: &dyn SubscriberDao, msg: &JobMsg, cause: &dyn fmt::Display) -> MessageOutcome {
    let failed = msg.state.failed_by_broker(cause);
    warn!(
        instance_id = %msg.instance_id,
        token = %msg.state.token,
        method = %msg.state.method,
        error = %cause,
        "cleanup failed, broker is marking the job failed"
    );
    match dao.set_state(&msg.instance_id, &failed) {
        Ok(_) => MessageOutcome::Demoted,
        Err(e) => {
            error!(
                instance_id = %msg.instance_id,
                token = %msg.state.token,
                error = %e,
                "unable to record broker failure, job still reads succeeded"
            );
            MessageOutcome::DemotionLost
        }
    }
}

/// Treat NotFound as an already-completed delete.
fn ignore_missing(result: StateResult<()>) -> StateResult<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!(error = %e, "already removed");
            Ok(())
        }
        other => other,
    }
}
