//! Error types for the document engine.
//!
//! Everything except [`DocumentError::Store`] is a local validation failure
//! raised before any store call is made. Store errors are passed through
//! untouched.

use docstack_model::{StoreError, StoreErrorCode};

/// Document engine error.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The update set is empty, a field value is missing, or an update
    /// targets a field the engine owns.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// A composite partition key was only partially supplied.
    #[error("invalid updates: {0}")]
    InvalidUpdates(String),

    /// A value breaks a key-role constraint (e.g. a partial sort key).
    #[error("invalid update value: {0}")]
    InvalidUpdateValue(String),

    /// An access pattern references an index missing from the layout.
    #[error("index {index} not found for collection {collection}")]
    IndexNotFound {
        /// Collection declaring the access pattern.
        collection: String,
        /// The missing index.
        index: String,
    },

    /// A transactional batch failed local validation.
    #[error("transaction validation failed: {0}")]
    TransactionValidation(String),

    /// The idempotency token was reused with a different batch.
    #[error("idempotent parameter mismatch: {0}")]
    IdempotentParameterMismatch(String),

    /// A dotted key path is malformed.
    #[error("invalid key path '{0}'")]
    InvalidKeyPath(String),

    /// A document is not an object or lacks a usable identifier.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A collection declaration is inconsistent.
    #[error("invalid access pattern: {0}")]
    InvalidAccessPattern(String),

    /// The collection has not been registered.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A stored attribute could not be turned back into JSON.
    #[error("cannot decode stored attribute: {0}")]
    Marshal(String),

    /// Error returned by the backing store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DocumentError {
    /// Returns the store error code if this error came from the store.
    #[must_use]
    pub fn store_code(&self) -> Option<StoreErrorCode> {
        match self {
            Self::Store(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Convenience result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
