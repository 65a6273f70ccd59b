//! Secondary index entry planning.
//!
//! Pure computation: given a model, topic, and an object's values, produce
//! the exact keyspace entries a write must hold. The store applies plans
//! through a transaction; this module never touches the backend.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use strata_codec::{append_key_field, CodecError, DateTime, FieldValue, ObjectId};

use crate::error::{DbError, DbResult};
use crate::keys;
use crate::model::{IndexDef, Model};
use crate::object::lookup_tags;
use crate::ttl;

/// One keyspace entry an object state requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub keyspace: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Insert-if-absent instead of put.
    pub unique: bool,
    /// Index named in a duplicate-key error.
    pub index_name: String,
}

/// Every entry one object state requires, plus the expiration instants
/// that form its mark.
#[derive(Debug, Clone)]
pub(crate) struct EntrySet {
    pub entries: Vec<IndexEntry>,
    pub expirations: Vec<DateTime>,
}

/// Split of two entry sets for an in-place update.
#[derive(Debug)]
pub(crate) struct EntryDiff {
    /// Keys only the old state held.
    pub removals: Vec<IndexEntry>,
    /// Keys only the new state holds, subject to uniqueness checks.
    pub inserts: Vec<IndexEntry>,
    /// Keys present in both states whose value changed.
    pub rewrites: Vec<IndexEntry>,
}

/// Computes the full entry set for one object state.
pub(crate) fn plan_entries(
    model: &Model,
    topic: &str,
    id: &ObjectId,
    values: &BTreeMap<u16, FieldValue>,
) -> DbResult<EntrySet> {
    let expirations = ttl_expirations(model, values)?;
    let mut entry_value = id.encoded().to_vec();
    ttl::append_mark(&mut entry_value, &expirations)?;

    let mut entries = Vec::new();
    for index in model.indexes() {
        let Some(key) = index_key(model, index, topic, id, values)? else {
            continue;
        };
        entries.push(IndexEntry {
            keyspace: model.index_keyspace(index),
            key,
            value: entry_value.clone(),
            unique: index.is_unique(),
            index_name: index.name().to_string(),
        });
    }
    for instant in &expirations {
        entries.push(IndexEntry {
            keyspace: model.ttl_keyspace(),
            key: keys::ttl_key(*instant, topic, id)?,
            value: Vec::new(),
            unique: false,
            index_name: String::new(),
        });
    }
    Ok(EntrySet {
        entries,
        expirations,
    })
}

/// The key for one index entry, or `None` when any projected field is
/// unset on this object (sparse indexes skip such objects).
fn index_key(
    model: &Model,
    index: &IndexDef,
    topic: &str,
    id: &ObjectId,
    values: &BTreeMap<u16, FieldValue>,
) -> DbResult<Option<Vec<u8>>> {
    let mut key = keys::index_prefix(topic, index.tag())?;
    for field in index.fields() {
        let resolved = model.resolve_path(field.path())?;
        let Some(value) = lookup_tags(values, &resolved.tags) else {
            return Ok(None);
        };
        append_key_field(&mut key, value, field.order())?;
    }
    if !index.is_unique() {
        key.extend_from_slice(&id.encoded());
    }
    Ok(Some(key))
}

/// Expiration instants for the object, one per TTL index, in index
/// declaration order.
fn ttl_expirations(model: &Model, values: &BTreeMap<u16, FieldValue>) -> DbResult<Vec<DateTime>> {
    let mut instants = Vec::new();
    for index in model.ttl_indexes() {
        // validated at build: a leading, required DateTime field
        let Some(leading) = index.fields().first() else {
            continue;
        };
        let resolved = model.resolve_path(leading.path())?;
        let value = lookup_tags(values, &resolved.tags).ok_or_else(|| {
            DbError::Serialization(CodecError::invalid_structure(format!(
                "TTL field `{}` is unset",
                leading.path()
            )))
        })?;
        let instant = value.as_datetime().ok_or_else(|| {
            DbError::Serialization(CodecError::invalid_structure(format!(
                "TTL field `{}` is not a DateTime",
                leading.path()
            )))
        })?;
        instants.push(instant);
    }
    Ok(instants)
}

/// Splits old and new entry sets into removals, unique-checked inserts,
/// and value rewrites. Keys held by both states with unchanged values
/// drop out entirely.
pub(crate) fn diff_entries(old: Vec<IndexEntry>, new: Vec<IndexEntry>) -> EntryDiff {
    let mut old_by_key: HashMap<(String, Vec<u8>), IndexEntry> = old
        .into_iter()
        .map(|entry| ((entry.keyspace.clone(), entry.key.clone()), entry))
        .collect();

    let mut inserts = Vec::new();
    let mut rewrites = Vec::new();
    for entry in new {
        match old_by_key.entry((entry.keyspace.clone(), entry.key.clone())) {
            Entry::Occupied(held) => {
                if held.get().value != entry.value {
                    rewrites.push(entry);
                }
                held.remove();
            }
            Entry::Vacant(_) => inserts.push(entry),
        }
    }
    let removals = old_by_key.into_values().collect();
    EntryDiff {
        removals,
        inserts,
        rewrites,
    }
}
