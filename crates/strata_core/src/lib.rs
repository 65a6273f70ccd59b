//! # Strata Core
//!
//! The StrataDB engine: a schema-driven object store layered over an
//! ordered key-value backend.
//!
//! Models declare typed, tagged fields and secondary indexes. The store
//! validates every write against its model, maintains one keyspace entry
//! per satisfied index, enforces unique indexes atomically, and expires
//! objects through TTL indexes. Queries walk an index range lazily and
//! resolve primary records against the same snapshot.
//!
//! ## Design principles
//!
//! - **Schema first**: no write happens without a registered model, and
//!   field tags (not names) are the wire identity.
//! - **Atomic operations**: each create, update, or delete is one backend
//!   transaction covering the primary record and every derived entry.
//! - **Backend neutral**: anything implementing
//!   [`Backend`](strata_storage::Backend) works, from the in-memory
//!   backend used in tests to the persistent redb backend.
//!
//! ## Example
//!
//! ```
//! use strata_codec::FieldType;
//! use strata_core::{Config, FieldDef, IndexDef, Model, ObjectValues, Query, Store};
//! use strata_storage::MemoryBackend;
//!
//! # fn main() -> strata_core::DbResult<()> {
//! let widget = Model::builder("widget")
//!     .field(FieldDef::required(1, "name", FieldType::Text))
//!     .field(FieldDef::optional(2, "price", FieldType::UInt32))
//!     .index(IndexDef::on("byName", ["name"]).unique())
//!     .build()?;
//!
//! let store = Store::open(MemoryBackend::new(), widget, Config::default())?;
//! let id = store.create(
//!     "widget",
//!     "tenant-1",
//!     ObjectValues::new().set("name", "anvil").set("price", 5u32),
//! )?;
//!
//! let found = store.find(&Query::new("widget", "byName", "tenant-1").matching(["anvil"]))?;
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].id(), id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod keys;
mod model;
mod mutation;
mod object;
mod query;
mod store;
mod ttl;
mod txn;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use model::{
    FieldDef, IndexDef, IndexField, Model, ModelBuilder, ModelInfo, ModelRegistry, ModelsProvider,
};
pub use mutation::{Mutation, MutationOp};
pub use object::{Object, ObjectValues};
pub use query::Query;
pub use store::Store;
pub use ttl::ReapSummary;
pub use txn::TxnState;

// The vocabulary types callers hold when talking to the engine.
pub use strata_codec::{CodecError, DateTime, FieldType, FieldValue, ObjectId, SortOrder};
pub use strata_storage::{Backend, Direction, Keyspace, MemoryBackend, RedbBackend, StorageError};
