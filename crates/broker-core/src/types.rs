//! Shared types used across the broker crates.
//!
//! These are the domain objects the work subscribers and the state store
//! exchange. Their persisted encoding lives in `broker-state`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque key/value document carried by instances and bindings.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Prefix on the `error` field of a job the broker itself demoted to
/// `Failed` after a compensating cleanup failed.
pub const BROKER_FAILURE_PREFIX: &str = "broker: compensating cleanup failed:";

// ── Job method / state ─────────────────────────────────────────────

/// The kind of asynchronous operation a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMethod {
    Provision,
    Deprovision,
    Bind,
    Unbind,
    Update,
}

impl JobMethod {
    pub const ALL: [JobMethod; 5] = [
        JobMethod::Provision,
        JobMethod::Deprovision,
        JobMethod::Bind,
        JobMethod::Unbind,
        JobMethod::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobMethod::Provision => "provision",
            JobMethod::Deprovision => "deprovision",
            JobMethod::Bind => "bind",
            JobMethod::Unbind => "unbind",
            JobMethod::Update => "update",
        }
    }
}

impl fmt::Display for JobMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `NotYetStarted → InProgress → {Succeeded, Failed}`. The only backwards
/// edge is the broker-initiated `Succeeded → Failed` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    NotYetStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl State {
    pub const ALL: [State; 4] = [
        State::NotYetStarted,
        State::InProgress,
        State::Succeeded,
        State::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::NotYetStarted => "not_yet_started",
            State::InProgress => "in_progress",
            State::Succeeded => "succeeded",
            State::Failed => "failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown job state: {0:?}")]
pub struct ParseStateError(String);

impl FromStr for State {
    type Err = ParseStateError;

    /// Accepts `in_progress`, `in-progress` and `in progress` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

// ── JobState ───────────────────────────────────────────────────────

/// Durable record of one asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Unique, immutable key assigned when the operation starts.
    pub token: String,
    pub method: JobMethod,
    pub state: State,
    /// Name of the executing workload. Advisory only.
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error: String,
}

impl JobState {
    pub fn new(token: impl Into<String>, method: JobMethod, state: State) -> Self {
        Self {
            token: token.into(),
            method,
            state,
            pod_name: String::new(),
            description: String::new(),
            error: String::new(),
        }
    }

    /// Copy of this job forced to `Failed` by the broker, with `diagnostic`
    /// recorded behind [`BROKER_FAILURE_PREFIX`]. The method is unchanged.
    pub fn failed_by_broker(&self, diagnostic: impl fmt::Display) -> Self {
        let mut failed = self.clone();
        failed.state = State::Failed;
        failed.error = format!("{BROKER_FAILURE_PREFIX} {diagnostic}");
        failed
    }

    /// Whether this failure was recorded by the broker rather than reported
    /// by the executor.
    pub fn is_broker_failure(&self) -> bool {
        self.state == State::Failed && self.error.starts_with(BROKER_FAILURE_PREFIX)
    }
}

/// A job state paired with the instance that owns it, as returned by the
/// recovery index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverStatus {
    pub instance_id: String,
    pub state: JobState,
}

/// Credentials a provision or bind workload extracted for its consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCredentials {
    pub credentials: serde_json::Map<String, serde_json::Value>,
}

// ── Instances ──────────────────────────────────────────────────────

/// Namespace/platform pair a service instance was requested from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub namespace: String,
    pub platform: String,
}

/// A provisioned workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    /// Catalog entry this instance was provisioned from (not owned).
    pub spec_id: String,
    pub context: Context,
    pub parameters: Option<Parameters>,
    pub binding_ids: BTreeSet<String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, spec_id: impl Into<String>, context: Context) -> Self {
        Self {
            id: id.into(),
            spec_id: spec_id.into(),
            context,
            parameters: None,
            binding_ids: BTreeSet::new(),
        }
    }

    /// Record a binding. Returns false if it was already attached.
    pub fn add_binding(&mut self, binding_id: &str) -> bool {
        self.binding_ids.insert(binding_id.to_string())
    }

    /// Detach a binding. Returns false if it was not attached.
    pub fn remove_binding(&mut self, binding_id: &str) -> bool {
        self.binding_ids.remove(binding_id)
    }
}

/// A credential-granting attachment to a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindInstance {
    pub id: String,
    pub service_id: String,
    pub parameters: Option<Parameters>,
    /// Token of the job that created this binding.
    pub create_job_key: String,
}
