//! Credentials Store error types.

use sso_core::ErrorKind;
use thiserror::Error;

/// The kind half of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The connection to the embedded database could not be established
    /// or was lost.
    Connection,
    /// A single statement failed (bad query, constraint violation).
    Statement,
    /// A transaction failed and was rolled back.
    Transaction,
    /// Rollback itself failed; the connection is now considered
    /// compromised and every subsequent call will fail fast.
    Compromised,
    /// Catchall.
    Unknown,
}

/// A Credentials Store failure.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    /// The failure's classification.
    pub kind: StorageErrorKind,
    /// A human-readable description.
    pub message: String,
}

impl StorageError {
    /// Build a new storage error.
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(e: surrealdb::Error) -> Self {
        Self::new(StorageErrorKind::Statement, e.to_string())
    }
}

/// Map a storage failure onto the daemon-wide [`ErrorKind`] taxonomy, per
/// §7's propagation rule ("CS errors map to StoreFailed/RemoveFailed/
/// InternalServer at the SC boundary").
#[must_use]
pub fn map_to_error_kind(err: &StorageError, is_remove: bool) -> ErrorKind {
    match err.kind {
        StorageErrorKind::Transaction if is_remove => ErrorKind::RemoveFailed,
        StorageErrorKind::Transaction => ErrorKind::StoreFailed,
        StorageErrorKind::Connection | StorageErrorKind::Compromised | StorageErrorKind::Statement => {
            ErrorKind::InternalServer
        }
        StorageErrorKind::Unknown => ErrorKind::InternalServer,
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
