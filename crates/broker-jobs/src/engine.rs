//! WorkEngine — wires the message bus to the five work subscribers.

use std::collections::BTreeMap;
use std::sync::Arc;

use broker_core::JobMethod;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::MessageBus;
use crate::dao::SubscriberDao;
use crate::subscriber::{
    self, BindWorkSubscriber, DeprovisionWorkSubscriber, ProvisionWorkSubscriber,
    SubscriberStats, UnbindWorkSubscriber, UpdateWorkSubscriber, WorkSubscriber,
};

/// Running subscriber tasks plus the producer handle executors publish on.
pub struct WorkEngine {
    bus: MessageBus,
    tasks: Vec<(JobMethod, JoinHandle<SubscriberStats>)>,
}

impl WorkEngine {
    /// Create the bus and spawn one subscriber task per job method.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(dao: Arc<dyn SubscriberDao>, capacity: usize) -> Self {
        let (bus, mut receivers) = MessageBus::new(capacity);

        let subscribers: [Arc<dyn WorkSubscriber>; 5] = [
            Arc::new(ProvisionWorkSubscriber::new(dao.clone())) as Arc<dyn WorkSubscriber>,
            Arc::new(DeprovisionWorkSubscriber::new(dao.clone())),
            Arc::new(BindWorkSubscriber::new(dao.clone())),
            Arc::new(UnbindWorkSubscriber::new(dao.clone())),
            Arc::new(UpdateWorkSubscriber::new(dao)),
        ];

        let mut tasks = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            let method = sub.method();
            if let Some(rx) = receivers.take(method) {
                tasks.push((method, subscriber::spawn(sub, rx)));
            }
        }

        info!(subscribers = tasks.len(), capacity, "work engine started");
        Self { bus, tasks }
    }

    /// A producer handle for executors.
    ///
    /// Every clone must be dropped before [`shutdown`](Self::shutdown) can
    /// complete.
    pub fn bus(&self) -> MessageBus {
        self.bus.clone()
    }

    /// Close the bus and wait for every subscriber to drain its channel.
    pub async fn shutdown(self) -> BTreeMap<JobMethod, SubscriberStats> {
        self.bus.close();

        let mut report = BTreeMap::new();
        for (method, task) in self.tasks {
            match task.await {
                Ok(stats) => {
                    report.insert(method, stats);
                }
                Err(e) => error!(%method, error = %e, "work subscriber task failed"),
            }
        }
        info!(subscribers = report.len(), "work engine stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::JobMsg;
    use crate::testing::{Op, RecordingDao};
    use broker_core::{JobState, State};

    fn msg(instance: &str, token: &str, method: JobMethod, state: State) -> JobMsg {
        JobMsg::new(instance, JobState::new(token, method, state))
    }

    // ── Scenarios ──────────────────────────────────────────────────

    #[tokio::test]
    async fn in_progress_provision_is_recorded_without_cleanup() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        let engine = WorkEngine::start(dao.clone(), 8);

        engine
            .bus()
            .publish(msg("i1", "t1", JobMethod::Provision, State::InProgress))
            .await
            .unwrap();
        engine.shutdown().await;

        assert_eq!(dao.store().get_state("t1").unwrap().state, State::InProgress);
        assert_eq!(dao.calls(Op::DeleteServiceInstance), 0);
    }

    #[tokio::test]
    async fn succeeded_deprovision_removes_instance() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        let engine = WorkEngine::start(dao.clone(), 8);

        engine
            .bus()
            .publish(msg("i1", "t1", JobMethod::Deprovision, State::Succeeded))
            .await
            .unwrap();
        let report = engine.shutdown().await;

        assert_eq!(report[&JobMethod::Deprovision].processed, 1);
        assert_eq!(dao.store().get_state("t1").unwrap().state, State::Succeeded);
        assert!(dao.store().get_service_instance("i1").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn failed_cleanup_leaves_instance_and_fails_job() {
        let dao = RecordingDao::new();
        dao.seed_instance("i1");
        dao.fail(Op::DeleteServiceInstance);
        let engine = WorkEngine::start(dao.clone(), 8);

        engine
            .bus()
            .publish(msg("i1", "t1", JobMethod::Deprovision, State::Succeeded))
            .await
            .unwrap();
        let report = engine.shutdown().await;

        assert_eq!(report[&JobMethod::Deprovision].demoted, 1);
        let stored = dao.store().get_state("t1").unwrap();
        assert_eq!(stored.state, State::Failed);
        assert!(!stored.error.is_empty());
        assert!(dao.store().get_service_instance("i1").is_ok());
    }

    // ── Draining and routing ───────────────────────────────────────

    #[tokio::test]
    async fn shutdown_drains_every_channel() {
        let dao = RecordingDao::new();
        let engine = WorkEngine::start(dao.clone(), 16);
        let bus = engine.bus();

        let mut sent = 0;
        for method in JobMethod::ALL {
            for i in 0..3 {
                bus.publish(msg("i1", &format!("{method}-{i}"), method, State::InProgress))
                    .await
                    .unwrap();
                sent += 1;
            }
        }
        drop(bus);

        let report = engine.shutdown().await;
        assert_eq!(report.len(), JobMethod::ALL.len());
        let processed: usize = report.values().map(|s| s.processed).sum();
        assert_eq!(processed, sent);
        assert_eq!(dao.calls(Op::SetState), sent);
        for stats in report.values() {
            assert_eq!(stats.processed, 3);
        }
    }

    #[tokio::test]
    async fn per_method_order_is_preserved() {
        let dao = RecordingDao::new();
        let engine = WorkEngine::start(dao.clone(), 8);
        let bus = engine.bus();

        // Same token, increasing states: the last write wins.
        for state in [State::NotYetStarted, State::InProgress, State::Succeeded] {
            bus.publish(msg("i1", "t1", JobMethod::Update, state))
                .await
                .unwrap();
        }
        drop(bus);
        engine.shutdown().await;

        assert_eq!(dao.store().get_state("t1").unwrap().state, State::Succeeded);
    }
}
