//! Bind subscriber: credential bookkeeping and binding attachment.

use std::sync::Arc;

use broker_core::{ExtractedCredentials, JobMethod, State};
use broker_state::StateResult;
use tracing::{error, info, warn};

use super::{MessageOutcome, WorkSubscriber, record_state};
use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// Records bind progress. On success, stores the binding's credentials and
/// attaches the binding to its service instance.
///
/// Both side effects are best effort: a failure is logged and the job stays
/// `Succeeded`, since the binding itself exists.
pub struct BindWorkSubscriber {
    dao: Arc<dyn SubscriberDao>,
}

impl BindWorkSubscriber {
    pub fn new(dao: Arc<dyn SubscriberDao>) -> Self {
        Self { dao }
    }

    fn store_credentials(&self, binding_id: &str, creds: &ExtractedCredentials) -> bool {
        match self.dao.set_extracted_credentials(binding_id, creds) {
            Ok(()) => true,
            Err(e) => {
                error!(%binding_id, error = %e, "unable to store extracted credentials");
                false
            }
        }
    }

    fn attach(&self, instance_id: &str, binding_id: &str) -> StateResult<()> {
        let mut instance = self.dao.get_service_instance(instance_id)?;
        if instance.add_binding(binding_id) {
            self.dao.set_service_instance(instance_id, &instance)?;
        }
        Ok(())
    }
}

impl WorkSubscriber for BindWorkSubscriber {
    fn method(&self) -> JobMethod {
        JobMethod::Bind
    }

    fn handle(&self, msg: &JobMsg) -> MessageOutcome {
        if !record_state(self.dao.as_ref(), msg) {
            return MessageOutcome::NotRecorded;
        }
        if msg.state.state != State::Succeeded {
            return MessageOutcome::Recorded;
        }
        let Some(binding_id) = msg.binding_id.as_deref() else {
            warn!(instance_id = %msg.instance_id, token = %msg.state.token, "bind succeeded without a binding id");
            return MessageOutcome::Recorded;
        };

        let mut complete = true;
        if let Some(creds) = &msg.extracted_credentials {
            complete &= self.store_credentials(binding_id, creds);
        }
        if let Err(e) = self.attach(&msg.instance_id, binding_id) {
            error!(instance_id = %msg.instance_id, %binding_id, error = %e, "unable to attach binding to instance");
            complete = false;
        }

        if complete {
            info!(instance_id = %msg.instance_id, %binding_id, token = %msg.state.token, "bind succeeded");
            MessageOutcome::Completed
        } else {
            MessageOutcome::Recorded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Op, RecordingDao};
    use broker_core::JobState;
    use serde_json::json;

    fn succeeded() -> JobMsg {
        JobMsg::new("i1", JobState::new("t1", JobMethod::Bind, State::Succeeded))
            .with_binding("b1")
            .with_credentials(ExtractedCredentials {
                credentials: json!({ "uri": "postgres://db" }).as_object().cloned().unwrap(),
            })
    }

    #[test]
    fn success_attaches_binding_and_stores_credentials() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        let sub = BindWorkSubscriber::new(dao.clone());

        assert_eq!(sub.handle(&succeeded()), MessageOutcome::Completed);

        let instance = dao.store().get_service_instance("i1").unwrap();
        assert!(instance.binding_ids.contains("b1"));
        assert!(dao.store().get_extracted_credentials("b1").is_ok());
    }

    #[test]
    fn repeated_success_is_idempotent() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        let sub = BindWorkSubscriber::new(dao.clone());

        sub.handle(&succeeded());
        sub.handle(&succeeded());

        assert_eq!(dao.calls(Op::SetServiceInstance), 1);
        let instance = dao.store().get_service_instance("i1").unwrap();
        assert_eq!(instance.binding_ids.len(), 1);
    }

    #[test]
    fn missing_instance_keeps_job_succeeded() {
        let dao = RecordingDao::new();
        let sub = BindWorkSubscriber::new(dao.clone());

        assert_eq!(sub.handle(&succeeded()), MessageOutcome::Recorded);
        assert_eq!(dao.store().get_state("t1").unwrap().state, State::Succeeded);
    }

    #[test]
    fn in_progress_has_no_side_effects() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        let sub = BindWorkSubscriber::new(dao.clone());

        let msg = JobMsg::new("i1", JobState::new("t1", JobMethod::Bind, State::InProgress))
            .with_binding("b1");
        assert_eq!(sub.handle(&msg), MessageOutcome::Recorded);
        assert_eq!(dao.calls(Op::GetServiceInstance), 0);
        assert_eq!(dao.calls(Op::SetCredentials), 0);
    }
}
