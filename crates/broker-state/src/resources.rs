//! Persisted resource schema.
//!
//! These are the bodies stored inside a `StoredObject`. They follow the
//! cluster-object conventions of the broker's custom resources: camelCase
//! fields, free-form documents flattened into JSON strings, enum values
//! stored as plain strings.

use serde::{Deserialize, Serialize};

/// Label carrying the owning instance of a job state.
pub const JOB_STATE_INSTANCE_LABEL: &str = "instanceId";

/// Label mirroring the lifecycle state of a job state.
pub const JOB_STATE_LABEL: &str = "state";

pub const STATE_NOT_YET_STARTED: &str = "notYetStarted";
pub const STATE_IN_PROGRESS: &str = "inProgress";
pub const STATE_SUCCEEDED: &str = "succeeded";
pub const STATE_FAILED: &str = "failed";

pub const METHOD_PROVISION: &str = "provision";
pub const METHOD_DEPROVISION: &str = "deprovision";
pub const METHOD_BIND: &str = "bind";
pub const METHOD_UNBIND: &str = "unbind";
pub const METHOD_UPDATE: &str = "update";

pub const ASYNC_OPTIONAL: &str = "optional";
pub const ASYNC_REQUIRED: &str = "required";
pub const ASYNC_UNSUPPORTED: &str = "unsupported";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleSpec {
    pub runtime: i32,
    pub version: String,
    pub fq_name: String,
    pub image: String,
    pub tags: Vec<String>,
    pub bindable: bool,
    pub description: String,
    #[serde(rename = "async")]
    pub async_type: String,
    /// JSON-encoded metadata object.
    pub metadata: String,
    pub plans: Vec<PlanSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON-encoded metadata object.
    pub metadata: String,
    pub free: bool,
    pub bindable: bool,
    pub updates_to: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
    pub bind_parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSpec {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    /// JSON object of the form `{"default": <value>}`.
    pub default: String,
    #[serde(rename = "maxlength")]
    pub deprecated_max_length: i32,
    pub max_length: i32,
    pub min_length: i32,
    pub pattern: String,
    pub multiple_of: f64,
    pub maximum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
    pub required: bool,
    pub updatable: bool,
    pub display_type: String,
    pub display_group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSpec {
    pub namespace: String,
    pub platform: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInstanceSpec {
    pub bundle_id: String,
    pub context: ContextSpec,
    /// JSON-encoded parameters; empty when the instance has none.
    pub parameters: String,
    pub binding_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceBindingSpec {
    pub service_instance_id: String,
    /// JSON-encoded parameters; empty when the binding has none.
    pub parameters: String,
    pub job_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStateSpec {
    pub state: String,
    pub method: String,
    pub pod_name: String,
    pub error: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialsSpec {
    /// JSON-encoded credentials object.
    pub credentials: String,
}
