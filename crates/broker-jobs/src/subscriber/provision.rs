//! Provision subscriber.

use std::sync::Arc;

use broker_core::{JobMethod, State};
use tracing::{error, info};

use super::{MessageOutcome, WorkSubscriber, record_state};
use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// Records provision progress and stores the credentials a successful
/// provision extracted, keyed by instance ID.
pub struct ProvisionWorkSubscriber {
    dao: Arc<dyn SubscriberDao>,
}

impl ProvisionWorkSubscriber {
    pub fn new(dao: Arc<dyn SubscriberDao>) -> Self {
        Self { dao }
    }
}

impl WorkSubscriber for ProvisionWorkSubscriber {
    fn method(&self) -> JobMethod {
        JobMethod::Provision
    }

    fn handle(&self, msg: &JobMsg) -> MessageOutcome {
        if !record_state(self.dao.as_ref(), msg) {
            return MessageOutcome::NotRecorded;
        }
        if msg.state.state != State::Succeeded {
            return MessageOutcome::Recorded;
        }

        let Some(creds) = &msg.extracted_credentials else {
            info!(instance_id = %msg.instance_id, token = %msg.state.token, "provision succeeded");
            return MessageOutcome::Completed;
        };
        // The instance exists either way; credentials can be extracted again.
        match self.dao.set_extracted_credentials(&msg.instance_id, creds) {
            Ok(()) => {
                info!(instance_id = %msg.instance_id, token = %msg.state.token, "provision succeeded, credentials stored");
                MessageOutcome::Completed
            }
            Err(e) => {
                error!(instance_id = %msg.instance_id, token = %msg.state.token, error = %e, "unable to store extracted credentials");
                MessageOutcome::Recorded
            }
        }
    }
}
