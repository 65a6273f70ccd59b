//! Error types for backend operations.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named keyspace has not been created on this backend.
    #[error("keyspace not found: {name}")]
    KeyspaceMissing {
        /// The requested keyspace name.
        name: String,
    },

    /// A concurrent transaction touched data this transaction read or wrote.
    ///
    /// Conflicts are transient: the failed transaction can be retried from
    /// the beginning and will usually succeed.
    #[error("transaction conflict: concurrent modification detected")]
    Conflict,

    /// The backing store is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The backend rejected an operation.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a `KeyspaceMissing` error.
    #[must_use]
    pub fn keyspace_missing(name: impl Into<String>) -> Self {
        Self::KeyspaceMissing { name: name.into() }
    }

    /// Creates a `Corrupted` error.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns `true` if this error is a transient conflict worth retrying.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
