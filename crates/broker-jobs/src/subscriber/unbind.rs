//! Unbind subscriber and its binding cleanup.

use std::sync::Arc;

use broker_core::{JobMethod, State};
use broker_state::StateResult;
use tracing::{info, warn};

use super::{MessageOutcome, WorkSubscriber, demote, ignore_missing, record_state};
use crate::dao::SubscriberDao;
use crate::message::JobMsg;

/// Records unbind progress and removes the binding once the unbind
/// succeeds.
///
/// Mirrors [`DeprovisionWorkSubscriber`](super::DeprovisionWorkSubscriber):
/// a failed binding delete demotes the job to `Failed`.
pub struct UnbindWorkSubscriber {
    dao: Arc<dyn SubscriberDao>,
}

impl UnbindWorkSubscriber {
    pub fn new(dao: Arc<dyn SubscriberDao>) -> Self {
        Self { dao }
    }

    /// Remove the binding record, then its credentials and its entry on
    /// the owning instance.
    ///
    /// Only the binding delete decides the outcome.
    pub fn cleanup(&self, instance_id: &str, binding_id: &str) -> StateResult<()> {
        ignore_missing(self.dao.delete_bind_instance(binding_id))?;

        if let Err(e) = ignore_missing(self.dao.delete_extracted_credentials(binding_id)) {
            warn!(%binding_id, error = %e, "unable to delete extracted credentials");
        }
        if let Err(e) = self.detach(instance_id, binding_id) {
            warn!(%instance_id, %binding_id, error = %e, "unable to detach binding from instance");
        }
        Ok(())
    }

    fn detach(&self, instance_id: &str, binding_id: &str) -> StateResult<()> {
        let mut instance = match self.dao.get_service_instance(instance_id) {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if instance.remove_binding(binding_id) {
            self.dao.set_service_instance(instance_id, &instance)?;
        }
        Ok(())
    }
}

impl WorkSubscriber for UnbindWorkSubscriber {
    fn method(&self) -> JobMethod {
        JobMethod::Unbind
    }

    fn handle(&self, msg: &JobMsg) -> MessageOutcome {
        if !record_state(self.dao.as_ref(), msg) {
            return MessageOutcome::NotRecorded;
        }
        if msg.state.state != State::Succeeded {
            return MessageOutcome::Recorded;
        }
        let Some(binding_id) = msg.binding_id.as_deref() else {
            return demote(self.dao.as_ref(), msg, &"unbind succeeded without a binding id");
        };

        match self.cleanup(&msg.instance_id, binding_id) {
            Ok(()) => {
                info!(instance_id = %msg.instance_id, %binding_id, token = %msg.state.token, "unbind succeeded, binding removed");
                MessageOutcome::Completed
            }
            Err(e) => demote(self.dao.as_ref(), msg, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Op, RecordingDao};
    use broker_core::{BindInstance, JobState};

    fn seed_binding(dao: &RecordingDao) {
        let mut si = dao.seed_instance("i1");
        si.add_binding("b1");
        dao.store().set_service_instance("i1", &si).unwrap();
        dao.store()
            .set_bind_instance(
                "b1",
                &BindInstance {
                    id: "b1".to_string(),
                    service_id: "i1".to_string(),
                    parameters: None,
                    create_job_key: "t0".to_string(),
                },
            )
            .unwrap();
    }

    fn succeeded() -> JobMsg {
        JobMsg::new("i1", JobState::new("t1", JobMethod::Unbind, State::Succeeded)).with_binding("b1")
    }

    #[test]
    fn success_removes_binding_and_detaches_it() {
        let dao = RecordingDao::new();
        seed_binding(&dao);
        let sub = UnbindWorkSubscriber::new(dao.clone());

        assert_eq!(sub.handle(&succeeded()), MessageOutcome::Completed);

        assert!(dao.store().get_bind_instance("b1").unwrap_err().is_not_found());
        let instance = dao.store().get_service_instance("i1").unwrap();
        assert!(instance.binding_ids.is_empty());
        assert_eq!(dao.store().get_state("t1").unwrap().state, State::Succeeded);
    }

    #[test]
    fn failed_delete_demotes_job() {
        let dao = RecordingDao::new();
        seed_binding(&dao);
        dao.fail(Op::DeleteBindInstance);
        let sub = UnbindWorkSubscriber::new(dao.clone());

        assert_eq!(sub.handle(&succeeded()), MessageOutcome::Demoted);

        let stored = dao.store().get_state("t1").unwrap();
        assert!(stored.is_broker_failure());
        assert_eq!(stored.method, JobMethod::Unbind);
        assert!(dao.store().get_bind_instance("b1").is_ok());
    }

    #[test]
    fn detach_failure_keeps_job_succeeded() {
        let dao = RecordingDao::new();
        seed_binding(&dao);
        dao.fail(Op::SetServiceInstance);
        let sub = UnbindWorkSubscriber::new(dao.clone());

        assert_eq!(sub.handle(&succeeded()), MessageOutcome::Completed);
        assert_eq!(dao.store().get_state("t1").unwrap().state, State::Succeeded);
    }

    #[test]
    fn missing_binding_id_demotes_job() {
        let dao = RecordingDao::new();
        let sub = UnbindWorkSubscriber::new(dao.clone());

        let msg = JobMsg::new("i1", JobState::new("t1", JobMethod::Unbind, State::Succeeded));
        assert_eq!(sub.handle(&msg), MessageOutcome::Demoted);
        assert_eq!(dao.calls(Op::DeleteBindInstance), 0);
        assert!(dao.store().get_state("t1").unwrap().is_broker_failure());
    }

    #[test]
    fn in_progress_keeps_binding() {
        let dao = RecordingDao::new();
        seed_binding(&dao);
        let sub = UnbindWorkSubscriber::new(dao.clone());

        let msg = JobMsg::new("i1", JobState::new("t1", JobMethod::Unbind, State::InProgress))
            .with_binding("b1");
        assert_eq!(sub.handle(&msg), MessageOutcome::Recorded);
        assert_eq!(dao.calls(Op::DeleteBindInstance), 0);
        assert!(dao.store().get_bind_instance("b1").is_ok());
    }
}
