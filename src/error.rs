//! Error types for the debate feedback store

use thiserror::Error;

/// Result type used by every store operation
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the local store.
///
/// `Storage` and `Constraint` both mean the transaction was rolled back and no
/// partial state was committed. `SchemaMismatch` is fatal at open time and
/// needs an explicit reset.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite I/O or constraint failure inside a transaction
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A write was rejected at the repository boundary (dangling reference,
    /// row scoped to the wrong parent)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Update targeting an id that does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Status state-machine or upload progress violation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// On-disk layout is incompatible with this build
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A store call made from inside another one on the same thread
    #[error("Nested {0} access: this thread already holds the connection")]
    NestedTransaction(&'static str),

    #[error("Database lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("Background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, StoreError::InvalidTransition(_))
    }

    pub fn is_nested_transaction(&self) -> bool {
        matches!(self, StoreError::NestedTransaction(_))
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, StoreError::SchemaMismatch { .. })
    }

    /// True for failures that left the store untouched because the
    /// transaction could not be applied
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(_) | StoreError::Constraint(_) | StoreError::Io(_)
        )
    }
}
