//! Error types for the StrataDB engine.

use thiserror::Error;

use strata_codec::{CodecError, ObjectId};
use strata_storage::StorageError;

/// Result type alias for engine operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by [`Store`](crate::Store) operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The addressed object does not exist, or has expired.
    #[error("object {id} not found in {model}/{topic}")]
    NotFound {
        /// Model the lookup ran against.
        model: String,
        /// Topic the lookup ran against.
        topic: String,
        /// Identifier that failed to resolve.
        id: ObjectId,
    },

    /// A unique index already holds an entry for the written field values.
    #[error("duplicate key in unique index `{index}`")]
    Duplicate {
        /// Name of the violated index.
        index: String,
    },

    /// A concurrent transaction touched the same keys first. The operation
    /// left no trace and may be retried as a whole.
    #[error("transaction conflict, retry the operation")]
    Conflict,

    /// A value could not be encoded or decoded against the model.
    #[error("serialization failed: {0}")]
    Serialization(#[from] CodecError),

    /// The storage backend failed for a non-conflict reason.
    #[error("backend error: {0}")]
    Backend(StorageError),

    /// A model declaration is invalid or clashes with one already registered.
    #[error("schema error: {message}")]
    Schema {
        /// Explanation of the rejected declaration.
        message: String,
    },

    /// A caller-supplied name, topic, or operand does not match the schema.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Explanation of the rejected argument.
        message: String,
    },
}

impl DbError {
    /// Creates a [`DbError::NotFound`] for the given address.
    pub fn not_found(model: impl Into<String>, topic: impl Into<String>, id: ObjectId) -> Self {
        Self::NotFound {
            model: model.into(),
            topic: topic.into(),
            id,
        }
    }

    /// Creates a [`DbError::Duplicate`] for the given index name.
    pub fn duplicate(index: impl Into<String>) -> Self {
        Self::Duplicate {
            index: index.into(),
        }
    }

    /// Creates a [`DbError::Schema`] with the given message.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a [`DbError::InvalidArgument`] with the given message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the whole operation may succeed.
    ///
    /// Only [`DbError::Conflict`] is retryable: the failed attempt rolled
    /// back completely, so a rerun observes a fresh snapshot.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl From<StorageError> for DbError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            Self::Conflict
        } else {
            Self::Backend(err)
        }
    }
}
