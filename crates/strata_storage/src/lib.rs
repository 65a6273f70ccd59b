//! # Strata Storage
//!
//! Ordered key-value backend trait and implementations for StrataDB.
//!
//! This crate provides the lowest-level storage abstraction for StrataDB.
//! Backends are **opaque ordered byte stores** - they keep keys sorted in
//! unsigned lexicographic order and never interpret the values they hold.
//!
//! ## Design Principles
//!
//! - Backends expose keyspaces, point reads, ordered scans, and atomic
//!   write transactions, nothing more
//! - No knowledge of StrataDB record formats, index entries, or expiration
//!   marks
//! - Must be `Send + Sync` for concurrent access
//! - StrataDB owns all key and value interpretation
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - for testing and ephemeral storage, with optimistic
//!   transactions
//! - [`RedbBackend`] - for persistent storage, built on `redb`
//!
//! ## Example
//!
//! ```rust
//! use strata_storage::{Backend, BackendTransaction, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! let ks = backend.create_keyspace("data").unwrap();
//!
//! let mut txn = backend.begin().unwrap();
//! txn.put(&ks, b"hello", b"world").unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(backend.get(&ks, b"hello").unwrap(), Some(b"world".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod keyspace;
mod memory;
mod redb;

pub use backend::{Backend, BackendTransaction, BackendView};
pub use error::{StorageError, StorageResult};
pub use keyspace::{next_prefix, Direction, Keyspace, ScanRange};
pub use memory::{MemoryBackend, MemoryScan, MemoryTxn, MemoryView};
pub use self::redb::{RedbBackend, RedbScan, RedbTxn, RedbView};
