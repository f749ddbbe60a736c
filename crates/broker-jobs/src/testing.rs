//! Recording store double for subscriber tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use broker_core::{Context, ExtractedCredentials, JobState, ServiceInstance};
use broker_state::{Dao, RedbObjectStore, StateError, StateResult};

use crate::dao::SubscriberDao;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    SetState,
    GetServiceInstance,
    SetServiceInstance,
    DeleteServiceInstance,
    DeleteBindInstance,
    SetCredentials,
    DeleteCredentials,
}

/// Wraps a real in-memory [`Dao`], counting calls per operation and
/// failing selected operations on demand.
pub(crate) struct RecordingDao {
    inner: Dao,
    calls: Mutex<HashMap<Op, usize>>,
    /// Op → first call number (1-based) that fails.
    failing: Mutex<HashMap<Op, usize>>,
}

impl RecordingDao {
    pub(crate) fn new() -> Arc<Self> {
        let store = RedbObjectStore::open_in_memory().unwrap();
        Arc::new(Self {
            inner: Dao::new(Arc::new(store), "broker"),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashMap::new()),
        })
    }

    /// The backing store, bypassing counting and failure injection.
    pub(crate) fn store(&self) -> &Dao {
        &self.inner
    }

    /// Seed a service instance directly.
    pub(crate) fn seed_instance(&self, id: &str) -> ServiceInstance {
        let si = ServiceInstance::new(id, "pg", Context::default());
        self.inner.set_service_instance(id, &si).unwrap();
        si
    }

    /// Fail every call to `op`.
    pub(crate) fn fail(&self, op: Op) {
        self.fail_from(op, 1);
    }

    /// Let the first `nth - 1` calls to `op` through, fail the rest.
    pub(crate) fn fail_from(&self, op: Op, nth: usize) {
        self.failing.lock().unwrap().insert(op, nth);
    }

    pub(crate) fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn check(&self, op: Op) -> StateResult<()> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(op).or_insert(0);
            *n += 1;
            *n
        };
        match self.failing.lock().unwrap().get(&op) {
            Some(&from) if n >= from => Err(StateError::Write(format!("injected {op:?} failure"))),
            _ => Ok(()),
        }
    }
}

impl SubscriberDao for RecordingDao {
    fn set_state(&self, instance_id: &str, state: &JobState) -> StateResult<String> {
        self.check(Op::SetState)?;
        self.inner.set_state(instance_id, state)
    }

    fn get_service_instance(&self, id: &str) -> StateResult<ServiceInstance> {
        self.check(Op::GetServiceInstance)?;
        self.inner.get_service_instance(id)
    }

    fn set_service_instance(&self, id: &str, instance: &ServiceInstance) -> StateResult<()> {
        self.check(Op::SetServiceInstance)?;
        self.inner.set_service_instance(id, instance)
    }

    fn delete_service_instance(&self, id: &str) -> StateResult<()> {
        self.check(Op::DeleteServiceInstance)?;
        self.inner.delete_service_instance(id)
    }

    fn delete_bind_instance(&self, id: &str) -> StateResult<()> {
        self.check(Op::DeleteBindInstance)?;
        self.inner.delete_bind_instance(id)
    }

    fn set_extracted_credentials(
        &self,
        id: &str,
        creds: &ExtractedCredentials,
    ) -> StateResult<()> {
        self.check(Op::SetCredentials)?;
        self.inner.set_extracted_credentials(id, creds)
    }

    fn delete_extracted_credentials(&self, id: &str) -> StateResult<()> {
        self.check(Op::DeleteCredentials)?;
        self.inner.delete_extracted_credentials(id)
    }
}
