//! The store operations work subscribers depend on.
//!
//! Subscribers take an `Arc<dyn SubscriberDao>` so tests can inject
//! failures without touching the storage engine.

use broker_core::{ExtractedCredentials, JobState, ServiceInstance};
use broker_state::{Dao, StateResult};

pub trait SubscriberDao: Send + Sync {
    /// Upsert `state` by token and refresh its index labels. Returns the
    /// token.
    fn set_state(&self, instance_id: &str, state: &JobState) -> StateResult<String>;

    fn get_service_instance(&self, id: &str) -> StateResult<ServiceInstance>;

    fn set_service_instance(&self, id: &str, instance: &ServiceInstance) -> StateResult<()>;

    fn delete_service_instance(&self, id: &str) -> StateResult<()>;

    fn delete_bind_instance(&self, id: &str) -> StateResult<()>;

    fn set_extracted_credentials(&self, id: &str, creds: &ExtractedCredentials)
        -> StateResult<()>;

    fn delete_extracted_credentials(&self, id: &str) -> StateResult<()>;
}

impl SubscriberDao for Dao {
    fn set_state(&self, instance_id: &str, state: &JobState) -> StateResult<String> {
        Dao::set_state(self, instance_id, state)
    }

    fn get_service_instance(&self, id: &str) -> StateResult<ServiceInstance> {
        Dao::get_service_instance(self, id)
    }

    fn set_service_instance(&self, id: &str, instance: &ServiceInstance) -> StateResult<()> {
        Dao::set_service_instance(self, id, instance)
    }

    fn delete_service_instance(&self, id: &str) -> StateResult<()> {
        Dao::delete_service_instance(self, id)
    }

    fn delete_bind_instance(&self, id: &str) -> StateResult<()> {
        Dao::delete_bind_instance(self, id)
    }

    fn set_extracted_credentials(
        &self,
        id: &str,
        creds: &ExtractedCredentials,
    ) -> StateResult<()> {
        Dao::set_extracted_credentials(self, id, creds)
    }

    fn delete_extracted_credentials(&self, id: &str) -> StateResult<()> {
        Dao::delete_extracted_credentials(self, id)
    }
}
