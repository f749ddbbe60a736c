//! RedbObjectStore — redb-backed cluster-object API.
//!
//! Stores every `StoredObject` as JSON in the table for its kind, keyed by
//! `{namespace}/{name}`. Each create/update/delete runs in its own write
//! transaction, so labels and body always change together. Supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};

use crate::error::{Collected, StateError, StateResult};
use crate::object::{LabelSelector, ObjectApi, ResourceKind, StoredObject};
use crate::tables::{namespace_prefix, object_key, table_for};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct RedbObjectStore {
    db: Arc<Database>,
}

impl RedbObjectStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// redb holds an exclusive lock on the file; a second open while the
    /// first is alive fails with `Locked`.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                StateError::Locked(path.display().to_string())
            }
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "object store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory object store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for kind in ResourceKind::ALL {
            txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Shared write path for create and update.
    ///
    /// `must_exist` selects update semantics; otherwise the key must be free.
    fn write(&self, mut object: StoredObject, must_exist: bool) -> StateResult<StoredObject> {
        let kind = object.kind;
        let key = object_key(&object.metadata.namespace, &object.metadata.name)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };

            object.metadata.resource_version = match (existing, must_exist) {
                (None, false) => 1,
                (Some(_), false) => {
                    return Err(StateError::AlreadyExists {
                        kind,
                        name: object.metadata.name.clone(),
                    });
                }
                (None, true) => return Err(StateError::not_found(kind, &object.metadata.name)),
                (Some(current), true) => {
                    let found = current.metadata.resource_version;
                    let expected = object.metadata.resource_version;
                    if expected != 0 && expected != found {
                        return Err(StateError::Conflict {
                            kind,
                            name: object.metadata.name.clone(),
                            expected,
                            found,
                        });
                    }
                    found + 1
                }
            };

            let value = serde_json::to_vec(&object).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, version = object.metadata.resource_version, "object stored");
        Ok(object)
    }

    /// Write raw bytes under `key`, bypassing encoding and key checks.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, kind: ResourceKind, key: &str, bytes: &[u8]) {
        let txn = self.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(table_for(kind)).unwrap();
            table.insert(key, bytes).unwrap();
        }
        txn.commit().unwrap();
    }
}

impl ObjectApi for RedbObjectStore {
    fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> StateResult<StoredObject> {
        let key = object_key(namespace, name)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(StateError::not_found(kind, name)),
        }
    }

    fn create(&self, object: StoredObject) -> StateResult<StoredObject> {
        self.write(object, false)
    }

    fn update(&self, object: StoredObject) -> StateResult<StoredObject> {
        self.write(object, true)
    }

    fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> StateResult<()> {
        let key = object_key(namespace, name)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, existed, "object deleted");
        if existed {
            Ok(())
        } else {
            Err(StateError::not_found(kind, name))
        }
    }

    fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StateResult<Collected<StoredObject>> {
        let prefix = namespace_prefix(namespace)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        let mut out = Collected::default();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                continue;
            }
            let object: StoredObject = match serde_json::from_slice(value.value()) {
                Ok(object) => object,
                Err(e) => {
                    warn!(%kind, %key, error = %e, "skipping undecodable object");
                    out.errors.push(StateError::Deserialize(format!("{kind} {key}: {e}")));
                    continue;
                }
            };
            if object.metadata.namespace == namespace && selector.matches(&object.metadata.labels) {
                out.items.push(object);
            }
        }
        debug!(%kind, %namespace, %selector, matched = out.items.len(), errors = out.errors.len(), "objects listed");
        Ok(out)
    }
}

fn decode(bytes: &[u8]) -> StateResult<StoredObject> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectMeta;
    use serde_json::json;

    fn job(namespace: &str, name: &str, state: &str) -> StoredObject {
        StoredObject {
            kind: ResourceKind::JobState,
            metadata: ObjectMeta::new(namespace, name)
                .with_label("instanceId", "i1")
                .with_label("state", state),
            spec: json!({ "state": state }),
        }
    }

    #[test]
    fn create_and_get() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        let created = store.create(job("ns", "t1", "inProgress")).unwrap();
        assert_eq!(created.metadata.resource_version, 1);

        let fetched = store.get(ResourceKind::JobState, "ns", "t1").unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        let err = store.get(ResourceKind::Bundle, "ns", "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_twice_is_rejected() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("ns", "t1", "inProgress")).unwrap();
        let err = store.create(job("ns", "t1", "inProgress")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { .. }));
    }

    #[test]
    fn update_bumps_version_and_checks_conflicts() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        let v1 = store.create(job("ns", "t1", "inProgress")).unwrap();

        let mut next = v1.clone();
        next.metadata.labels.insert("state".into(), "succeeded".into());
        let v2 = store.update(next).unwrap();
        assert_eq!(v2.metadata.resource_version, 2);

        // Writing again from the stale v1 copy must fail.
        let err = store.update(v1).unwrap_err();
        assert!(matches!(
            err,
            StateError::Conflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        let err = store.update(job("ns", "t1", "failed")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_reports_absence() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("ns", "t1", "inProgress")).unwrap();

        store.delete(ResourceKind::JobState, "ns", "t1").unwrap();
        let err = store.delete(ResourceKind::JobState, "ns", "t1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_filters_by_namespace_and_labels() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("ns", "t1", "inProgress")).unwrap();
        store.create(job("ns", "t2", "succeeded")).unwrap();
        store.create(job("other", "t3", "inProgress")).unwrap();

        let all = store
            .list(ResourceKind::JobState, "ns", &LabelSelector::everything())
            .unwrap();
        assert_eq!(all.items.len(), 2);

        let running = store
            .list(
                ResourceKind::JobState,
                "ns",
                &LabelSelector::eq("state", "inProgress"),
            )
            .unwrap()
            .items;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name(), "t1");
    }

    #[test]
    fn list_reports_undecodable_entries_and_keeps_the_rest() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("ns", "t1", "inProgress")).unwrap();
        store.insert_raw(ResourceKind::JobState, "ns/garbage", b"\x00not json");

        let listed = store
            .list(ResourceKind::JobState, "ns", &LabelSelector::everything())
            .unwrap();
        assert_eq!(listed.items.len(), 1);
        assert_eq!(listed.items[0].name(), "t1");
        assert_eq!(listed.errors.len(), 1);
        assert!(listed.errors.errors()[0].to_string().contains("ns/garbage"));
    }

    #[test]
    fn nested_namespaces_do_not_leak_into_list() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("a", "t1", "inProgress")).unwrap();
        // A record whose key sits under "a/" but whose metadata says otherwise.
        let mut stray = job("b", "t2", "inProgress");
        stray.metadata.resource_version = 1;
        store.insert_raw(
            ResourceKind::JobState,
            "a/t2",
            &serde_json::to_vec(&stray).unwrap(),
        );

        let listed = store
            .list(ResourceKind::JobState, "a", &LabelSelector::everything())
            .unwrap();
        let names: Vec<_> = listed.items.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["t1"]);
    }

    #[test]
    fn separator_in_namespace_or_name_is_rejected() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        for (ns, name) in [("a/b", "t1"), ("a", "b/t1")] {
            let err = store.create(job(ns, name, "inProgress")).unwrap_err();
            assert!(matches!(err, StateError::InvalidKey(_)), "{ns} {name}: {err}");
            let err = store.get(ResourceKind::JobState, ns, name).unwrap_err();
            assert!(matches!(err, StateError::InvalidKey(_)));
        }
        let err = store
            .list(ResourceKind::JobState, "a/b", &LabelSelector::everything())
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidKey(_)));
    }

    #[test]
    fn kinds_do_not_share_names() {
        let store = RedbObjectStore::open_in_memory().unwrap();
        store.create(job("ns", "x", "inProgress")).unwrap();
        let err = store.get(ResourceKind::ServiceInstance, "ns", "x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("broker.redb");

        {
            let store = RedbObjectStore::open(&db_path).unwrap();
            store.create(job("ns", "t1", "inProgress")).unwrap();
        }

        // Reopen the same database file.
        let store = RedbObjectStore::open(&db_path).unwrap();
        let obj = store.get(ResourceKind::JobState, "ns", "t1").unwrap();
        assert_eq!(obj.label("state"), Some("inProgress"));
    }

    #[test]
    fn second_open_of_a_held_file_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("broker.redb");

        let _held = RedbObjectStore::open(&db_path).unwrap();
        let err = RedbObjectStore::open(&db_path).err().unwrap();
        assert!(matches!(err, StateError::Locked(_)), "{err}");
    }
}
