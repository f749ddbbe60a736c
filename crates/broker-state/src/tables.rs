//! redb table definitions for the broker object store.
//!
//! One table per resource kind. Keys are `{namespace}/{name}`; values are
//! JSON-serialized `StoredObject`s.

use redb::TableDefinition;

use crate::error::{StateError, StateResult};
use crate::object::ResourceKind;

pub const BUNDLES: TableDefinition<&str, &[u8]> = TableDefinition::new("bundles");

pub const SERVICE_INSTANCES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("service_instances");

pub const SERVICE_BINDINGS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("service_bindings");

/// Job states keyed by `{namespace}/{token}`.
pub const JOB_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("job_states");

pub const EXTRACTED_CREDENTIALS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("extracted_credentials");

pub fn table_for(kind: ResourceKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        ResourceKind::Bundle => BUNDLES,
        ResourceKind::ServiceInstance => SERVICE_INSTANCES,
        ResourceKind::ServiceBinding => SERVICE_BINDINGS,
        ResourceKind::JobState => JOB_STATES,
        ResourceKind::ExtractedCredentials => EXTRACTED_CREDENTIALS,
    }
}

const KEY_SEPARATOR: char = '/';

/// The table key for `name` in `namespace`. Neither part may contain the
/// separator, so distinct pairs never share a key.
pub fn object_key(namespace: &str, name: &str) -> StateResult<String> {
    check_segment("namespace", namespace)?;
    check_segment("name", name)?;
    Ok(format!("{namespace}{KEY_SEPARATOR}{name}"))
}

/// Prefix shared by every key in `namespace`.
pub fn namespace_prefix(namespace: &str) -> StateResult<String> {
    check_segment("namespace", namespace)?;
    Ok(format!("{namespace}{KEY_SEPARATOR}"))
}

fn check_segment(what: &str, value: &str) -> StateResult<()> {
    if value.contains(KEY_SEPARATOR) {
        return Err(StateError::InvalidKey(format!(
            "{what} {value:?} contains {KEY_SEPARATOR:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_join_namespace_and_name() {
        assert_eq!(object_key("broker", "t1").unwrap(), "broker/t1");
        assert_eq!(namespace_prefix("broker").unwrap(), "broker/");
    }

    #[test]
    fn separator_is_rejected_in_either_part() {
        assert!(matches!(object_key("a/b", "c"), Err(StateError::InvalidKey(_))));
        assert!(matches!(object_key("a", "b/c"), Err(StateError::InvalidKey(_))));
        assert!(matches!(namespace_prefix("a/"), Err(StateError::InvalidKey(_))));
    }
}
