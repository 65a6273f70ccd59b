//! Persistent backend built on `redb`.

use std::fmt;
use std::path::Path;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

use crate::backend::{Backend, BackendTransaction, BackendView};
use crate::error::{StorageError, StorageResult};
use crate::keyspace::{Direction, Keyspace, ScanRange};

fn table_def(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

fn map_storage(err: redb::StorageError) -> StorageError {
    match err {
        redb::StorageError::Io(io_err) => StorageError::Io(io_err),
        redb::StorageError::Corrupted(message) => StorageError::corrupted(message),
        other => StorageError::backend(other.to_string()),
    }
}

fn map_database(err: redb::DatabaseError) -> StorageError {
    match err {
        redb::DatabaseError::Storage(inner) => map_storage(inner),
        other => StorageError::backend(other.to_string()),
    }
}

fn map_transaction(err: redb::TransactionError) -> StorageError {
    match err {
        redb::TransactionError::Storage(inner) => map_storage(inner),
        other => StorageError::backend(other.to_string()),
    }
}

fn map_table(name: &str, err: redb::TableError) -> StorageError {
    match err {
        redb::TableError::TableDoesNotExist(_) => StorageError::keyspace_missing(name),
        redb::TableError::Storage(inner) => map_storage(inner),
        other => StorageError::backend(other.to_string()),
    }
}

fn map_commit(err: redb::CommitError) -> StorageError {
    match err {
        redb::CommitError::Storage(inner) => map_storage(inner),
        other => StorageError::backend(other.to_string()),
    }
}

/// A persistent ordered key-value backend built on `redb`.
///
/// Each keyspace maps to one redb table. Reads run against copy-on-write
/// snapshots, so views stay stable while writers commit. redb admits a
/// single write transaction at a time: [`begin`](Backend::begin) blocks
/// until the previous writer finishes, which means transactions on this
/// backend never fail with [`StorageError::Conflict`].
///
/// # Example
///
/// ```rust
/// use strata_storage::{Backend, RedbBackend};
///
/// let dir = tempfile::tempdir().unwrap();
/// let backend = RedbBackend::create(dir.path().join("strata.redb")).unwrap();
/// let ks = backend.create_keyspace("data").unwrap();
///
/// backend.put(&ks, b"k", b"v").unwrap();
/// assert_eq!(backend.get(&ks, b"k").unwrap(), Some(b"v".to_vec()));
/// ```
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Opens the database file at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or is not a valid
    /// database.
    pub fn create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path).map_err(map_database)?;
        Ok(Self { db })
    }

    /// Opens an existing database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not a valid
    /// database.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::open(path).map_err(map_database)?;
        Ok(Self { db })
    }
}

impl fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbBackend").finish_non_exhaustive()
    }
}

impl Backend for RedbBackend {
    type View = RedbView;
    type Txn = RedbTxn;

    fn create_keyspace(&self, name: &str) -> StorageResult<Keyspace> {
        let txn = self.db.begin_write().map_err(map_transaction)?;
        txn.open_table(table_def(name))
            .map_err(|err| map_table(name, err))?;
        txn.commit().map_err(map_commit)?;
        Ok(Keyspace::new(name))
    }

    fn keyspace(&self, name: &str) -> StorageResult<Keyspace> {
        let txn = self.db.begin_read().map_err(map_transaction)?;
        txn.open_table(table_def(name))
            .map_err(|err| map_table(name, err))?;
        Ok(Keyspace::new(name))
    }

    fn view(&self) -> StorageResult<Self::View> {
        Ok(RedbView {
            txn: self.db.begin_read().map_err(map_transaction)?,
        })
    }

    fn begin(&self) -> StorageResult<Self::Txn> {
        Ok(RedbTxn {
            txn: self.db.begin_write().map_err(map_transaction)?,
        })
    }
}

/// A read snapshot of a [`RedbBackend`].
pub struct RedbView {
    txn: ReadTransaction,
}

impl BackendView for RedbView {
    type Scan = RedbScan;

    fn get(&self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        let guard = table.get(key).map_err(map_storage)?;
        Ok(guard.map(|value| value.value().to_vec()))
    }

    fn scan(
        &self,
        keyspace: &Keyspace,
        range: &ScanRange,
        direction: Direction,
    ) -> StorageResult<Self::Scan> {
        let table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        let inner = if range.is_empty() {
            None
        } else {
            Some(table.range::<&[u8]>(range.as_bounds()).map_err(map_storage)?)
        };
        Ok(RedbScan { inner, direction })
    }
}

impl fmt::Debug for RedbView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbView").finish_non_exhaustive()
    }
}

/// Iterator over a scan of a [`RedbView`].
pub struct RedbScan {
    inner: Option<redb::Range<'static, &'static [u8], &'static [u8]>>,
    direction: Direction,
}

impl Iterator for RedbScan {
    type Item = StorageResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.inner.as_mut()?;
        let item = match self.direction {
            Direction::Forward => inner.next(),
            Direction::Reverse => inner.next_back(),
        };
        item.map(|entry| {
            entry
                .map(|(key, value)| (key.value().to_vec(), value.value().to_vec()))
                .map_err(map_storage)
        })
    }
}

impl fmt::Debug for RedbScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbScan")
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

/// A write transaction against a [`RedbBackend`].
pub struct RedbTxn {
    txn: WriteTransaction,
}

impl BackendTransaction for RedbTxn {
    fn get(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        let guard = table.get(key).map_err(map_storage)?;
        Ok(guard.map(|value| value.value().to_vec()))
    }

    fn put(&mut self, keyspace: &Keyspace, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        table.insert(key, value).map_err(map_storage)?;
        Ok(())
    }

    fn insert_if_absent(
        &mut self,
        keyspace: &Keyspace,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool> {
        let mut table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        // redb admits one writer at a time, so the check cannot race
        // another transaction.
        let occupied = table.get(key).map_err(map_storage)?.is_some();
        if occupied {
            return Ok(false);
        }
        table.insert(key, value).map_err(map_storage)?;
        Ok(true)
    }

    fn delete(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<()> {
        let mut table = self
            .txn
            .open_table(table_def(keyspace.name()))
            .map_err(|err| map_table(keyspace.name(), err))?;
        table.remove(key).map_err(map_storage)?;
        Ok(())
    }

    fn commit(self) -> StorageResult<()> {
        self.txn.commit().map_err(map_commit)
    }

    fn rollback(self) -> StorageResult<()> {
        self.txn.abort().map_err(map_storage)
    }
}

impl fmt::Debug for RedbTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbTxn").finish_non_exhaustive()
    }
}
