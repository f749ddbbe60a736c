//! Notifications emitted by workload executors.

use broker_core::{ExtractedCredentials, JobMethod, JobState};
use serde::{Deserialize, Serialize};

/// A progress or completion report for one job.
///
/// `state` is the full record to persist, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMsg {
    pub instance_id: String,
    /// Target binding for bind and unbind jobs.
    #[serde(default)]
    pub binding_id: Option<String>,
    pub state: JobState,
    /// Set by provision and bind executors when they finish successfully.
    #[serde(default)]
    pub extracted_credentials: Option<ExtractedCredentials>,
}

impl JobMsg {
    pub fn new(instance_id: impl Into<String>, state: JobState) -> Self {
        Self {
            instance_id: instance_id.into(),
            binding_id: None,
            state,
            extracted_credentials: None,
        }
    }

    pub fn with_binding(mut self, binding_id: impl Into<String>) -> Self {
        self.binding_id = Some(binding_id.into());
        self
    }

    pub fn with_credentials(mut self, creds: ExtractedCredentials) -> Self {
        self.extracted_credentials = Some(creds);
        self
    }

    /// The channel this message is routed to.
    pub fn method(&self) -> JobMethod {
        self.state.method
    }
}
