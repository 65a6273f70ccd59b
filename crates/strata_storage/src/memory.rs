//! In-memory backend for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Backend, BackendTransaction, BackendView};
use crate::error::{StorageError, StorageResult};
use crate::keyspace::{Direction, Keyspace, ScanRange};

/// One committed entry. Deletes leave a tombstone behind so commit-time
/// validation can still see which commit removed the key.
#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    value: Option<Vec<u8>>,
}

type KeyspaceData = BTreeMap<Vec<u8>, Versioned>;

#[derive(Debug, Default)]
struct Shared {
    keyspaces: HashMap<String, KeyspaceData>,
    commit_seq: u64,
}

/// An in-memory ordered key-value backend.
///
/// All data lives in process memory. The backend is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Cloning is cheap: clones are handles onto the same shared state.
///
/// # Concurrency
///
/// Transactions are optimistic. Reads and conditional inserts record what
/// they observed, and [`commit`](BackendTransaction::commit) re-validates
/// those observations under a global lock before publishing. A transaction
/// overtaken by a concurrent commit fails with [`StorageError::Conflict`]
/// and can be retried from the start.
///
/// # Example
///
/// ```rust
/// use strata_storage::{Backend, BackendTransaction, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// let ks = backend.create_keyspace("data").unwrap();
///
/// let mut txn = backend.begin().unwrap();
/// txn.put(&ks, b"k", b"v").unwrap();
/// txn.commit().unwrap();
///
/// assert_eq!(backend.get(&ks, b"k").unwrap(), Some(b"v".to_vec()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<RwLock<Shared>>,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries in a keyspace.
    ///
    /// Useful for assertions in tests.
    #[must_use]
    pub fn len(&self, keyspace: &Keyspace) -> usize {
        self.shared
            .read()
            .keyspaces
            .get(keyspace.name())
            .map_or(0, |data| {
                data.values().filter(|entry| entry.value.is_some()).count()
            })
    }

    /// Returns `true` if the keyspace holds no live entries.
    #[must_use]
    pub fn is_empty(&self, keyspace: &Keyspace) -> bool {
        self.len(keyspace) == 0
    }
}

impl Backend for MemoryBackend {
    type View = MemoryView;
    type Txn = MemoryTxn;

    fn create_keyspace(&self, name: &str) -> StorageResult<Keyspace> {
        let mut shared = self.shared.write();
        shared.keyspaces.entry(name.to_string()).or_default();
        Ok(Keyspace::new(name))
    }

    fn keyspace(&self, name: &str) -> StorageResult<Keyspace> {
        if self.shared.read().keyspaces.contains_key(name) {
            Ok(Keyspace::new(name))
        } else {
            Err(StorageError::keyspace_missing(name))
        }
    }

    fn view(&self) -> StorageResult<Self::View> {
        // Deep copy keeps snapshot isolation trivially correct. This is the
        // testing backend, so the copy cost is accepted.
        Ok(MemoryView {
            keyspaces: self.shared.read().keyspaces.clone(),
        })
    }

    fn begin(&self) -> StorageResult<Self::Txn> {
        Ok(MemoryTxn {
            shared: Arc::clone(&self.shared),
            snapshot_seq: self.shared.read().commit_seq,
            reads: HashMap::new(),
            writes: HashMap::new(),
        })
    }
}

/// A snapshot of the committed state of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryView {
    keyspaces: HashMap<String, KeyspaceData>,
}

impl BackendView for MemoryView {
    type Scan = MemoryScan;

    fn get(&self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let data = self.data(keyspace)?;
        Ok(data.get(key).and_then(|entry| entry.value.clone()))
    }

    fn scan(
        &self,
        keyspace: &Keyspace,
        range: &ScanRange,
        direction: Direction,
    ) -> StorageResult<Self::Scan> {
        let data = self.data(keyspace)?;
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = if range.is_empty() {
            Vec::new()
        } else {
            data.range::<[u8], _>(range.as_bounds())
                .filter_map(|(key, entry)| {
                    entry.value.as_ref().map(|value| (key.clone(), value.clone()))
                })
                .collect()
        };
        if direction == Direction::Reverse {
            items.reverse();
        }
        Ok(MemoryScan {
            items: items.into_iter(),
        })
    }
}

impl MemoryView {
    fn data(&self, keyspace: &Keyspace) -> StorageResult<&KeyspaceData> {
        self.keyspaces
            .get(keyspace.name())
            .ok_or_else(|| StorageError::keyspace_missing(keyspace.name()))
    }
}

/// Iterator over a scan of a [`MemoryView`].
///
/// The matching entries are materialized when the scan starts; laziness is
/// not worth the bookkeeping for an in-memory test backend.
#[derive(Debug)]
pub struct MemoryScan {
    items: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl Iterator for MemoryScan {
    type Item = StorageResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(Ok)
    }
}

#[derive(Debug)]
struct Observation {
    version: Option<u64>,
    value: Option<Vec<u8>>,
}

/// An optimistic write transaction against a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryTxn {
    shared: Arc<RwLock<Shared>>,
    snapshot_seq: u64,
    reads: HashMap<(String, Vec<u8>), Observation>,
    writes: HashMap<(String, Vec<u8>), Option<Vec<u8>>>,
}

impl BackendTransaction for MemoryTxn {
    fn get(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let entry_key = (keyspace.name().to_string(), key.to_vec());
        if let Some(pending) = self.writes.get(&entry_key) {
            return Ok(pending.clone());
        }
        if let Some(observed) = self.reads.get(&entry_key) {
            return Ok(observed.value.clone());
        }

        // A keyspace this transaction has not created yet reads as empty;
        // writes materialize keyspaces lazily on commit, matching the
        // persistent backend.
        let observed = {
            let shared = self.shared.read();
            match shared
                .keyspaces
                .get(keyspace.name())
                .and_then(|data| data.get(key))
            {
                Some(entry) => Observation {
                    version: Some(entry.version),
                    value: entry.value.clone(),
                },
                None => Observation {
                    version: None,
                    value: None,
                },
            }
        };
        let value = observed.value.clone();
        self.reads.insert(entry_key, observed);
        Ok(value)
    }

    fn put(&mut self, keyspace: &Keyspace, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.writes.insert(
            (keyspace.name().to_string(), key.to_vec()),
            Some(value.to_vec()),
        );
        Ok(())
    }

    fn insert_if_absent(
        &mut self,
        keyspace: &Keyspace,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool> {
        // The read below lands in the read set, so a racing insert of the
        // same key is caught by commit-time validation.
        if self.get(keyspace, key)?.is_some() {
            return Ok(false);
        }
        self.writes.insert(
            (keyspace.name().to_string(), key.to_vec()),
            Some(value.to_vec()),
        );
        Ok(true)
    }

    fn delete(&mut self, keyspace: &Keyspace, key: &[u8]) -> StorageResult<()> {
        self.writes
            .insert((keyspace.name().to_string(), key.to_vec()), None);
        Ok(())
    }

    fn commit(self) -> StorageResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut shared = self.shared.write();

        for ((name, key), observed) in &self.reads {
            let current = shared
                .keyspaces
                .get(name)
                .and_then(|data| data.get(key))
                .map(|entry| entry.version);
            if current != observed.version {
                return Err(StorageError::Conflict);
            }
        }
        for (name, key) in self.writes.keys() {
            let current = shared
                .keyspaces
                .get(name)
                .and_then(|data| data.get(key))
                .map(|entry| entry.version);
            if current.is_some_and(|version| version > self.snapshot_seq) {
                return Err(StorageError::Conflict);
            }
        }

        let seq = shared.commit_seq + 1;
        for ((name, key), value) in self.writes {
            let data = shared.keyspaces.entry(name).or_default();
            data.insert(key, Versioned { version: seq, value });
        }
        shared.commit_seq = seq;
        Ok(())
    }

    fn rollback(self) -> StorageResult<()> {
        // Nothing was shared before commit; dropping the buffers is enough.
        Ok(())
    }
}
