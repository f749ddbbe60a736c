//! Dao — typed broker operations over the cluster-object API.
//!
//! Every entity is stored under the Dao's namespace with its primary key as
//! the object name: spec ID, instance ID, binding ID, job token. `set_*`
//! operations are upserts and are safe to replay with identical content.
//!
//! Job states additionally carry the recovery index labels
//! (`instanceId`, `state`), written in the same object update as the body.

use std::sync::Arc;

use broker_core::{
    BindInstance, ExtractedCredentials, JobState, RecoverStatus, ServiceInstance, Spec,
    SpecManifest, State,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::conversion::*;
use crate::error::{BatchError, Collected, StateError, StateResult};
use crate::object::{LabelSelector, ObjectApi, ObjectMeta, ResourceKind, StoredObject};
use crate::resources::*;

/// Handle to the broker's persisted state.
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct Dao {
    api: Arc<dyn ObjectApi>,
    namespace: String,
}

impl Dao {
    pub fn new(api: Arc<dyn ObjectApi>, namespace: impl Into<String>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether `err` only means the addressed record does not exist.
    pub fn is_not_found(&self, err: &StateError) -> bool {
        err.is_not_found()
    }

    // ── Generic object plumbing ────────────────────────────────────

    fn get_object(&self, kind: ResourceKind, name: &str) -> StateResult<StoredObject> {
        self.api.get(kind, &self.namespace, name)
    }

    /// Update the object if it exists, otherwise create it.
    ///
    /// Labels in `labels` replace same-named labels on the stored object;
    /// other stored labels are kept.
    fn upsert<T: Serialize>(
        &self,
        kind: ResourceKind,
        name: &str,
        labels: &[(&str, &str)],
        body: &T,
    ) -> StateResult<StoredObject> {
        let spec = serde_json::to_value(body)
            .map_err(|e| StateError::Serialize(e.to_string()))?;

        match self.api.get(kind, &self.namespace, name) {
            Ok(mut existing) => {
                debug!(%kind, %name, "updating existing object");
                for (k, v) in labels {
                    existing.metadata.labels.insert(k.to_string(), v.to_string());
                }
                existing.spec = spec;
                self.api.update(existing)
            }
            Err(e) if e.is_not_found() => {
                debug!(%kind, %name, "creating object");
                let mut metadata = ObjectMeta::new(&self.namespace, name);
                for (k, v) in labels {
                    metadata = metadata.with_label(k, v);
                }
                self.api.create(StoredObject {
                    kind,
                    metadata,
                    spec,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn delete_object(&self, kind: ResourceKind, name: &str) -> StateResult<()> {
        self.api.delete(kind, &self.namespace, name)
    }

    fn list_objects(
        &self,
        kind: ResourceKind,
        selector: &LabelSelector,
    ) -> StateResult<Collected<StoredObject>> {
        self.api.list(kind, &self.namespace, selector)
    }

    // ── Specs ──────────────────────────────────────────────────────

    pub fn get_spec(&self, id: &str) -> StateResult<Spec> {
        debug!(spec_id = %id, "get spec");
        let obj = self.get_object(ResourceKind::Bundle, id)?;
        let bundle: BundleSpec = decode_body(&obj)?;
        bundle_to_spec(&bundle, id)
    }

    pub fn set_spec(&self, id: &str, spec: &Spec) -> StateResult<()> {
        debug!(spec_id = %id, "set spec");
        let bundle = spec_to_bundle(spec)?;
        self.upsert(ResourceKind::Bundle, id, &[], &bundle)?;
        Ok(())
    }

    pub fn delete_spec(&self, id: &str) -> StateResult<()> {
        debug!(spec_id = %id, "delete spec");
        self.delete_object(ResourceKind::Bundle, id)
    }

    /// Store every spec in the manifest, in key order, stopping at the first
    /// failure.
    pub fn batch_set_specs(&self, specs: &SpecManifest) -> Result<(), BatchError> {
        let mut ids: Vec<&String> = specs.keys().collect();
        ids.sort();
        for (completed, id) in ids.into_iter().enumerate() {
            self.set_spec(id, &specs[id]).map_err(|source| BatchError {
                completed,
                key: id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Every stored spec that decodes. Undecodable bundles are reported in
    /// `errors` without hiding the rest.
    pub fn batch_get_specs(&self) -> StateResult<Collected<Spec>> {
        debug!("batch get specs");
        let listed = self
            .list_objects(ResourceKind::Bundle, &LabelSelector::everything())
            .inspect_err(|e| error!(error = %e, "unable to list bundles"))?;

        Ok(decode_each(listed, |obj| {
            decode_body::<BundleSpec>(obj).and_then(|b| bundle_to_spec(&b, obj.name()))
        }))
    }

    /// Delete each spec in order, stopping at the first failure.
    pub fn batch_delete_specs(&self, specs: &[Spec]) -> Result<(), BatchError> {
        for (completed, spec) in specs.iter().enumerate() {
            self.delete_spec(&spec.id).map_err(|source| BatchError {
                completed,
                key: spec.id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    // ── Service instances ──────────────────────────────────────────

    pub fn get_service_instance(&self, id: &str) -> StateResult<ServiceInstance> {
        debug!(instance_id = %id, "get service instance");
        let obj = self.get_object(ResourceKind::ServiceInstance, id)?;
        let spec: ServiceInstanceSpec = decode_body(&obj)?;
        service_instance_from_resource(&spec, id)
    }

    /// The instance together with the catalog spec it was provisioned from.
    pub fn get_service_instance_with_spec(&self, id: &str) -> StateResult<(ServiceInstance, Spec)> {
        let instance = self.get_service_instance(id)?;
        let spec = self.get_spec(&instance.spec_id)?;
        Ok((instance, spec))
    }

    pub fn set_service_instance(&self, id: &str, instance: &ServiceInstance) -> StateResult<()> {
        debug!(instance_id = %id, "set service instance");
        let spec = service_instance_to_resource(instance)?;
        self.upsert(ResourceKind::ServiceInstance, id, &[], &spec)
            .inspect_err(|e| error!(instance_id = %id, error = %e, "unable to save service instance"))?;
        Ok(())
    }

    pub fn delete_service_instance(&self, id: &str) -> StateResult<()> {
        debug!(instance_id = %id, "delete service instance");
        self.delete_object(ResourceKind::ServiceInstance, id)
    }

    // ── Bind instances ─────────────────────────────────────────────

    pub fn get_bind_instance(&self, id: &str) -> StateResult<BindInstance> {
        debug!(binding_id = %id, "get bind instance");
        let obj = self.get_object(ResourceKind::ServiceBinding, id)?;
        let spec: ServiceBindingSpec = decode_body(&obj)?;
        binding_from_resource(&spec, id)
    }

    pub fn set_bind_instance(&self, id: &str, binding: &BindInstance) -> StateResult<()> {
        debug!(binding_id = %id, "set bind instance");
        let spec = binding_to_resource(binding)?;
        self.upsert(ResourceKind::ServiceBinding, id, &[], &spec)
            .inspect_err(|e| error!(binding_id = %id, error = %e, "unable to save service binding"))?;
        Ok(())
    }

    pub fn delete_bind_instance(&self, id: &str) -> StateResult<()> {
        debug!(binding_id = %id, "delete bind instance");
        self.delete_object(ResourceKind::ServiceBinding, id)
    }

    // ── Job states ─────────────────────────────────────────────────

    /// Upsert a job state by token and refresh its index labels.
    ///
    /// An empty `instance_id` keeps whatever owner label is already stored.
    /// Returns the token.
    pub fn set_state(&self, instance_id: &str, state: &JobState) -> StateResult<String> {
        debug!(%instance_id, token = %state.token, state = %state.state, "set job state");
        let spec = job_state_to_resource(state);
        let state_label = state_to_resource(state.state);

        let mut labels = vec![(JOB_STATE_LABEL, state_label)];
        if !instance_id.is_empty() {
            labels.push((JOB_STATE_INSTANCE_LABEL, instance_id));
        }

        self.upsert(ResourceKind::JobState, &state.token, &labels, &spec)
            .inspect_err(|e| error!(token = %state.token, error = %e, "unable to store job state"))?;
        Ok(state.token.clone())
    }

    pub fn get_state(&self, token: &str) -> StateResult<JobState> {
        let obj = self
            .get_object(ResourceKind::JobState, token)
            .inspect_err(|e| {
                if !e.is_not_found() {
                    error!(%token, error = %e, "unable to get job state");
                }
            })?;
        let spec: JobStateSpec = decode_body(&obj)?;
        job_state_from_resource(&spec, token)
    }

    pub fn get_state_by_key(&self, key: &str) -> StateResult<JobState> {
        self.get_state(key)
    }

    // ── Recovery index ─────────────────────────────────────────────

    /// Every job currently labelled with `state`, paired with its owner.
    pub fn find_by_state(&self, state: State) -> StateResult<Collected<RecoverStatus>> {
        debug!(%state, "find job states by state");
        let selector = LabelSelector::eq(JOB_STATE_LABEL, state_to_resource(state));
        let listed = self
            .list_objects(ResourceKind::JobState, &selector)
            .inspect_err(|e| error!(%state, error = %e, "unable to list job states"))?;

        Ok(decode_each(listed, |obj| {
            Ok(RecoverStatus {
                instance_id: obj.label(JOB_STATE_INSTANCE_LABEL).unwrap_or_default().to_string(),
                state: decode_job_state(obj)?,
            })
        }))
    }

    /// Jobs owned by `instance_id` that are currently in `state`.
    pub fn find_by_owner_and_state(
        &self,
        instance_id: &str,
        state: State,
    ) -> StateResult<Collected<JobState>> {
        debug!(%instance_id, %state, "find instance jobs by state");
        let selector = LabelSelector::eq(JOB_STATE_INSTANCE_LABEL, instance_id)
            .and(JOB_STATE_LABEL, state_to_resource(state));
        let listed = self
            .list_objects(ResourceKind::JobState, &selector)
            .inspect_err(|e| error!(%instance_id, %state, error = %e, "unable to list job states"))?;

        Ok(decode_each(listed, decode_job_state))
    }

    // ── Extracted credentials ──────────────────────────────────────

    pub fn get_extracted_credentials(&self, id: &str) -> StateResult<ExtractedCredentials> {
        let obj = self.get_object(ResourceKind::ExtractedCredentials, id)?;
        let spec: CredentialsSpec = decode_body(&obj)?;
        credentials_from_resource(&spec, id)
    }

    pub fn set_extracted_credentials(
        &self,
        id: &str,
        creds: &ExtractedCredentials,
    ) -> StateResult<()> {
        debug!(%id, "set extracted credentials");
        let spec = credentials_to_resource(creds, id)?;
        self.upsert(ResourceKind::ExtractedCredentials, id, &[], &spec)?;
        Ok(())
    }

    pub fn delete_extracted_credentials(&self, id: &str) -> StateResult<()> {
        debug!(%id, "delete extracted credentials");
        self.delete_object(ResourceKind::ExtractedCredentials, id)
    }
}

/// Decode a stored object's spec body into its resource type.
fn decode_body<T: DeserializeOwned>(obj: &StoredObject) -> StateResult<T> {
    serde_json::from_value(obj.spec.clone())
        .map_err(|e| StateError::conversion(obj.kind, obj.name(), e))
}

/// Decode every listed object, keeping the failures the backend already
/// reported alongside the new ones.
fn decode_each<T>(
    listed: Collected<StoredObject>,
    decode: impl Fn(&StoredObject) -> StateResult<T>,
) -> Collected<T> {
    let mut out = Collected {
        items: Vec::with_capacity(listed.items.len()),
        errors: listed.errors,
    };
    for obj in &listed.items {
        match decode(obj) {
            Ok(item) => out.items.push(item),
            Err(e) => out.errors.push(e),
        }
    }
    out
}

fn decode_job_state(obj: &StoredObject) -> StateResult<JobState> {
    let spec: JobStateSpec = decode_body(obj)?;
    job_state_from_resource(&spec, obj.name())
}
