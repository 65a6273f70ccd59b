//! Backend trait definitions.

use crate::error::StorageResult;
use crate::keyspace::{Direction, Keyspace, ScanRange};

/// An ordered key-value backend for StrataDB.
///
/// Backends are **opaque ordered byte stores**. They keep byte-string keys
/// sorted in unsigned lexicographic order inside named keyspaces and move
/// values in and out untouched. StrataDB owns all format interpretation -
/// backends do not understand records, index entries, or expiration marks.
///
/// # Invariants
///
/// - Keys within a keyspace are unique and sorted by unsigned byte order
/// - Keyspaces are disjoint: a scan never yields entries from another keyspace
/// - A committed transaction is visible to every view and transaction opened
///   after the commit
/// - A rolled-back or dropped transaction leaves no trace
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`MemoryBackend`](crate::MemoryBackend) - for testing
/// - [`RedbBackend`](crate::RedbBackend) - for persistent storage
pub trait Backend: Send + Sync + 'static {
    /// The read snapshot type produced by [`view`](Backend::view).
    type View: BackendView;

    /// The write transaction type produced by [`begin`](Backend::begin).
    type Txn: BackendTransaction;

    /// Creates the named keyspace if it does not exist and returns a handle.
    ///
    /// Creating a keyspace that already exists is not an error; the existing
    /// data is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the new keyspace.
    fn create_keyspace(&self, name: &str) -> StorageResult<Keyspace>;

    /// Returns a handle to an existing keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyspaceMissing`](crate::StorageError::KeyspaceMissing)
    /// if the keyspace has never been created on this backend.
    fn keyspace(&self, name: &str) -> StorageResult<Keyspace>;

    /// Opens a read snapshot of the committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be established.
    fn view(&self) -> StorageResult<Self::View>;

    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    fn begin(&self) -> StorageResult<Self::Txn>;

    /// Reads a single key from the committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.view()?.get(keyspace, key)
    }

    /// Writes a single key in a transaction of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the commit fails.
    fn put(&self, keyspace: &Keyspace, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut txn = self.begin()?;
        txn.put(keyspace, key, value)?;
        txn.commit()
    }

    /// Deletes a single key in a transaction of its own.
    ///
    /// Deleting an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or the commit fails.
    fn delete(&self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<()> {
        let mut txn = self.begin()?;
        txn.delete(keyspace, key)?;
        txn.commit()
    }
}

/// A consistent read snapshot of a backend.
///
/// Every read through one view observes the same committed state, no matter
/// how many transactions commit while the view is alive. This is what lets a
/// scan and the point lookups it triggers agree with each other.
pub trait BackendView: Send {
    /// The iterator type returned by [`scan`](BackendView::scan).
    type Scan: Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>> + Send;

    /// Reads the value stored under `key`, or `None` if the key is vacant.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Scans `range` in the given direction, yielding key-value pairs in key
    /// order without materializing the whole range up front.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be started. Faults encountered
    /// mid-scan surface as `Err` items from the iterator.
    fn scan(
        &self,
        keyspace: &Keyspace,
        range: &ScanRange,
        direction: Direction,
    ) -> StorageResult<Self::Scan>;
}

/// An atomic write transaction.
///
/// Writes stay private to the transaction until [`commit`]; reads through the
/// transaction observe its own pending writes layered over the state it
/// started from. Dropping a transaction without committing discards it.
///
/// Read methods take `&mut self` so that optimistic implementations can
/// record the read set for commit-time validation.
///
/// Writing through a keyspace that was never created materializes it on
/// commit. Only reads outside a transaction are guaranteed to report a
/// missing keyspace.
///
/// [`commit`]: BackendTransaction::commit
pub trait BackendTransaction: Send {
    /// Reads `key` as this transaction sees it, own writes included.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&mut self, keyspace: &Keyspace, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Stores `value` under `key` only if the key is vacant.
    ///
    /// Returns `true` when the value was stored and `false` when the key was
    /// already occupied. The check and the store are atomic with respect to
    /// every other transaction, which makes this the primitive for enforcing
    /// uniqueness.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the write fails.
    fn insert_if_absent(
        &mut self,
        keyspace: &Keyspace,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool>;

    /// Removes `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<()>;

    /// Atomically publishes every write in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) if a
    /// concurrent transaction invalidated this one, or another error if the
    /// commit cannot be made durable. Either way no write of this transaction
    /// becomes visible.
    fn commit(self) -> StorageResult<()>;

    /// Discards every write in this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to release transaction state.
    fn rollback(self) -> StorageResult<()>;
}
