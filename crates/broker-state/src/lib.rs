//! broker-state — persistent state store for the service broker.
//!
//! Objects are addressed the way a cluster-object API addresses them:
//! kind + namespace + name, with string labels that can be filtered by a
//! `key=value` selector. [`RedbObjectStore`] implements that API on top of
//! [redb](https://docs.rs/redb); [`Dao`] layers the broker's typed
//! operations on it.
//!
//! # Architecture
//!
//! ```text
//! Dao (typed CRUD, batch ops, recovery index)
//!   ├── conversion (domain types ↔ persisted resources)
//!   └── Arc<dyn ObjectApi>
//!         └── RedbObjectStore (one table per kind, `{namespace}/{name}` keys)
//! ```
//!
//! The job-state recovery index is the pair of labels `instanceId` and
//! `state` that [`Dao::set_state`] writes in the same transaction as the
//! record body, so label queries always agree with the latest write.

pub mod conversion;
pub mod dao;
pub mod error;
pub mod object;
pub mod resources;
pub mod store;
pub mod tables;

pub use dao::Dao;
pub use error::{BatchError, Collected, MultiError, Outcome, StateError, StateResult};
pub use object::{LabelSelector, ObjectApi, ObjectMeta, ResourceKind, StoredObject};
pub use store::RedbObjectStore;
