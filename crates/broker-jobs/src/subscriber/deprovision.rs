//! Deprovision subscriber and its instance cleanup.
//!
//! The instance delete is the only step that can demote a job; the
//! credential delete that follows is best effort.

use std::sync::Arc;

use broker_core::{JobMethod, State};
use broker_state::StateResult;
use tracing::{info, warn};

use super::{MessageOutcome, WorkSubscriber, demote, ignore_missing, record_state};
use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// Records deprovision progress and removes the service instance once the
/// deprovision succeeds.
///
/// After a succeeded message is handled, either the instance is gone and the
/// job reads `Succeeded`, or the instance is still present and the job reads
/// `Failed` with a broker diagnostic (unless that second write also failed).
pub struct DeprovisionWorkSubscriber {
    dao: Arc<dyn SubscriberDao>,
}

impl DeprovisionWorkSubscriber {
    pub fn new(dao: Arc<dyn SubscriberDao>) -> Self {
        Self { dao }
    }

    /// Remove everything the broker keeps for `instance_id`.
    ///
    /// Only the instance delete decides the outcome; leftover credentials
    /// are logged.
    pub fn cleanup(&self, instance_id: &str) -> StateResult<()> {
        ignore_missing(self.dao.delete_service_instance(instance_id))?;

        if let Err(e) = ignore_missing(self.dao.delete_extracted_credentials(instance_id)) {
            warn!(%instance_id, error = %e, "unable to delete extracted credentials");
        }
        Ok(())
    }
}

impl WorkSubscriber for DeprovisionWorkSubscriber {
    fn method(&self) -> JobMethod {
        JobMethod::Deprovision
    }

    fn handle(&self, msg: &JobMsg) -> MessageOutcome {
        if !record_state(self.dao.as_ref(), msg) {
            return MessageOutcome::NotRecorded;
        }
        if msg.state.state != State::Succeeded {
            return MessageOutcome::Recorded;
        }

        match self.cleanup(&msg.instance_id) {
            Ok(()) => {
                info!(instance_id = %msg.instance_id, token = %msg.state.token, "deprovision succeeded, instance removed");
                MessageOutcome::Completed
            }
            Err(e) => demote(self.dao.as_ref(), msg, &e),
        }
    }
}
