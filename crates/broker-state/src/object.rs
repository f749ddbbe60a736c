//! Cluster-object API model.
//!
//! Every persisted entity is a [`StoredObject`]: a kind, metadata
//! (name, namespace, labels, resource version) and an opaque JSON spec.
//! The [`ObjectApi`] trait is the only thing the [`Dao`](crate::Dao) knows
//! about the backend.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Collected, StateResult};

/// The resource kinds the broker persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Bundle,
    ServiceInstance,
    ServiceBinding,
    JobState,
    ExtractedCredentials,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Bundle,
        ResourceKind::ServiceInstance,
        ResourceKind::ServiceBinding,
        ResourceKind::JobState,
        ResourceKind::ExtractedCredentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bundle => "bundle",
            ResourceKind::ServiceInstance => "service-instance",
            ResourceKind::ServiceBinding => "service-binding",
            ResourceKind::JobState => "job-state",
            ResourceKind::ExtractedCredentials => "extracted-credentials",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Assigned by the backend. Zero on objects that were never stored;
    /// an update carrying a non-zero version must match the stored one.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            resource_version: 0,
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
}

impl StoredObject {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }
}

/// Conjunction of `key=value` requirements on object labels.
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn eq(key: &str, value: &str) -> Self {
        Self::default().and(key, value)
    }

    pub fn and(mut self, key: &str, value: &str) -> Self {
        self.requirements.push((key.to_string(), value.to_string()));
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Backend interface: namespaced, named objects with label queries.
///
/// Implementations must support concurrent calls on independent keys
/// without external locking.
pub trait ObjectApi: Send + Sync {
    /// Fetch one object. `NotFound` if absent.
    fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> StateResult<StoredObject>;

    /// Store a new object. `AlreadyExists` if the name is taken.
    fn create(&self, object: StoredObject) -> StateResult<StoredObject>;

    /// Replace an existing object. `NotFound` if absent, `Conflict` if the
    /// caller's resource version is stale.
    fn update(&self, object: StoredObject) -> StateResult<StoredObject>;

    /// Remove an object. `NotFound` if absent.
    fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> StateResult<()>;

    /// All objects of `kind` in `namespace` whose labels match `selector`.
    ///
    /// Entries that cannot be decoded are reported in `errors` and do not
    /// hide the rest. Since their labels are unreadable, they are reported
    /// whatever the selector.
    fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StateResult<Collected<StoredObject>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_requires_every_label() {
        let sel = LabelSelector::eq("instanceId", "i1").and("state", "inProgress");
        assert_eq!(sel.to_string(), "instanceId=i1,state=inProgress");

        assert!(sel.matches(&labels(&[("instanceId", "i1"), ("state", "inProgress")])));
        assert!(!sel.matches(&labels(&[("instanceId", "i1"), ("state", "failed")])));
        assert!(!sel.matches(&labels(&[("state", "inProgress")])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector::everything();
        assert_eq!(sel.to_string(), "");
        assert!(sel.matches(&BTreeMap::new()));
        assert!(sel.matches(&labels(&[("state", "failed")])));
    }
}
