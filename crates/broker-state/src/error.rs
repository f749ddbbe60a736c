//! Error types for the broker state store.

use std::fmt;

use thiserror::Error;

use crate::object::ResourceKind;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    /// Another handle, in this process or another, holds the database file.
    #[error("database {0} is already open elsewhere")]
    Locked(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("conflict on {kind} {name:?}: expected version {expected}, found {found}")]
    Conflict {
        kind: ResourceKind,
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("conversion error for {kind} {name:?}: {reason}")]
    Conversion {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Multi(#[from] MultiError),
}

impl StateError {
    /// True when the error only signals that the addressed object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    pub(crate) fn not_found(kind: ResourceKind, name: &str) -> Self {
        StateError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn conversion(kind: ResourceKind, name: &str, reason: impl fmt::Display) -> Self {
        StateError::Conversion {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Several independent failures collected from one bulk operation.
#[derive(Debug, Default)]
pub struct MultiError(Vec<StateError>);

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: StateError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[StateError] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<StateError> {
        self.0
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<StateError> for MultiError {
    fn from_iter<I: IntoIterator<Item = StateError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How much of a bulk read succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No item failed (including the empty case).
    Complete,
    /// Some items decoded, some failed.
    Partial,
    /// Every item failed.
    Failed,
}

/// Items recovered by a bulk read, alongside the per-item failures.
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub errors: MultiError,
}

impl<T> Collected<T> {
    pub fn outcome(&self) -> Outcome {
        match (self.items.is_empty(), self.errors.is_empty()) {
            (_, true) => Outcome::Complete,
            (false, false) => Outcome::Partial,
            (true, false) => Outcome::Failed,
        }
    }

    /// Strict view: any per-item failure fails the whole read.
    pub fn into_result(self) -> Result<Vec<T>, MultiError> {
        if self.errors.is_empty() {
            Ok(self.items)
        } else {
            Err(self.errors)
        }
    }
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: MultiError::new(),
        }
    }
}

/// A fail-fast batch write stopped part-way.
///
/// `completed` items were applied before `key` failed; nothing after
/// `key` was attempted.
#[derive(Debug, Error)]
#[error("batch stopped after {completed} item(s) at {key:?}: {source}")]
pub struct BatchError {
    pub completed: usize,
    pub key: String,
    #[source]
    pub source: StateError,
}
