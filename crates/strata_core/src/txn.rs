//! Transaction coordination.
//!
//! Every mutating store operation runs inside one backend transaction
//! owned by a [`Coordinator`]. Commit and rollback consume the
//! coordinator, and dropping one that is still open rolls it back, so no
//! code path can leak a half-applied write.

use std::fmt;

use strata_storage::{Backend, BackendTransaction, Keyspace, StorageError};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// Lifecycle of a coordinated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Created but not yet attached to a backend transaction.
    Idle,
    /// Accepting reads and writes.
    Open,
    /// Commit handed to the backend.
    Committing,
    /// Changes are durable and visible.
    Committed,
    /// Rollback handed to the backend.
    RollingBack,
    /// Changes are discarded.
    RolledBack,
}

impl TxnState {
    /// Whether the transaction still accepts operations.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the transaction reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

pub(crate) struct Coordinator<B: Backend> {
    txn: Option<B::Txn>,
    state: TxnState,
}

impl<B: Backend> Coordinator<B> {
    pub(crate) fn open(backend: &B) -> DbResult<Self> {
        let mut coordinator = Self {
            txn: None,
            state: TxnState::Idle,
        };
        coordinator.txn = Some(backend.begin()?);
        coordinator.state = TxnState::Open;
        Ok(coordinator)
    }

    fn backend_txn(&mut self) -> DbResult<&mut B::Txn> {
        match self.txn.as_mut() {
            Some(txn) if self.state.is_active() => Ok(txn),
            _ => Err(StorageError::backend("transaction is no longer open").into()),
        }
    }

    pub(crate) fn get(&mut self, keyspace: &Keyspace, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.backend_txn()?.get(keyspace, key)?)
    }

    pub(crate) fn put(&mut self, keyspace: &Keyspace, key: &[u8], value: &[u8]) -> DbResult<()> {
        Ok(self.backend_txn()?.put(keyspace, key, value)?)
    }

    /// Writes only when the key is vacant; `false` reports an occupant.
    pub(crate) fn insert_if_absent(
        &mut self,
        keyspace: &Keyspace,
        key: &[u8],
        value: &[u8],
    ) -> DbResult<bool> {
        Ok(self.backend_txn()?.insert_if_absent(keyspace, key, value)?)
    }

    pub(crate) fn delete(&mut self, keyspace: &Keyspace, key: &[u8]) -> DbResult<()> {
        Ok(self.backend_txn()?.delete(keyspace, key)?)
    }

    pub(crate) fn commit(mut self) -> DbResult<()> {
        self.state = TxnState::Committing;
        if let Some(txn) = self.txn.take() {
            txn.commit()?;
        }
        self.state = TxnState::Committed;
        debug!("transaction committed");
        Ok(())
    }

    pub(crate) fn rollback(mut self) -> DbResult<()> {
        self.state = TxnState::RollingBack;
        if let Some(txn) = self.txn.take() {
            txn.rollback()?;
        }
        self.state = TxnState::RolledBack;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl<B: Backend> Drop for Coordinator<B> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            self.state = TxnState::RollingBack;
            if let Err(err) = txn.rollback() {
                warn!(error = %err, "rollback failed while dropping a transaction");
            }
            self.state = TxnState::RolledBack;
        }
    }
}

impl<B: Backend> fmt::Debug for Coordinator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Runs `f` inside one transaction: commit on `Ok`, roll back on `Err`
/// while preserving the original error.
pub(crate) fn with_write<B, T, F>(backend: &B, f: F) -> DbResult<T>
where
    B: Backend,
    F: FnOnce(&mut Coordinator<B>) -> DbResult<T>,
{
    let mut txn = Coordinator::open(backend)?;
    match f(&mut txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback() {
                warn!(error = %rollback_err, "rollback failed while unwinding an error");
            }
            Err(err)
        }
    }
}
