//! Update subscriber.

use std::sync::Arc;

use broker_core::JobMethod;

use super::{MessageOutcome, WorkSubscriber, record_state};
use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// Records update progress. Updates have no success side effect.
pub struct UpdateWorkSubscriber {
    dao: Arc<dyn SubscriberDao>,
}

impl UpdateWorkSubscriber {
    pub fn new(dao: Arc<dyn SubscriberDao>) -> Self {
        Self { dao }
    }
}

impl WorkSubscriber for UpdateWorkSubscriber {
    fn method(&self) -> JobMethod {
        JobMethod::Update
    }

    fn handle(&self, msg: &JobMsg) -> MessageOutcome {
        if record_state(self.dao.as_ref(), msg) {
            MessageOutcome::Recorded
        } else {
            MessageOutcome::NotRecorded
        }
    }
}
