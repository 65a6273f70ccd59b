//! Stored objects and the values used to create them.

use std::collections::BTreeMap;

use strata_codec::{CodecError, DateTime, FieldValue, ObjectId, Record};

use crate::error::{DbError, DbResult};
use crate::model::{FieldDef, Model};

/// A decoded object: identity, bookkeeping, and field values by tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    id: ObjectId,
    revision: u64,
    updated_at: DateTime,
    values: BTreeMap<u16, FieldValue>,
}

impl Object {
    pub(crate) fn from_record(id: ObjectId, record: Record) -> Self {
        Self {
            id,
            revision: record.revision,
            updated_at: record.updated_at,
            values: record.fields.into_iter().collect(),
        }
    }

    /// The object identifier.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Creation instant, carried by the identifier.
    #[must_use]
    pub const fn created_at(&self) -> DateTime {
        self.id.timestamp()
    }

    /// Write revision, starting at 1 and incremented by every update.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Instant of the last create or update.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime {
        self.updated_at
    }

    /// The value stored under a top-level tag.
    #[must_use]
    pub fn value(&self, tag: u16) -> Option<&FieldValue> {
        self.values.get(&tag)
    }

    /// The value at a dotted path, resolved through the model.
    ///
    /// Returns `None` when the path does not resolve or the field is not
    /// set on this object.
    #[must_use]
    pub fn field(&self, model: &Model, path: &str) -> Option<&FieldValue> {
        let resolved = model.resolve_path(path).ok()?;
        lookup_tags(&self.values, &resolved.tags)
    }

    /// Iterates the top-level values in tag order.
    pub fn values(&self) -> impl Iterator<Item = (u16, &FieldValue)> {
        self.values.iter().map(|(t, v)| (*t, v))
    }
}

/// Walks a tag chain: the first hop through the top-level map, the rest
/// through nested groups.
pub(crate) fn lookup_tags<'a>(
    values: &'a BTreeMap<u16, FieldValue>,
    tags: &[u16],
) -> Option<&'a FieldValue> {
    let (first, rest) = tags.split_first()?;
    let mut current = values.get(first)?;
    for tag in rest {
        let children = current.as_nested()?;
        let at = children.binary_search_by_key(tag, |(t, _)| *t).ok()?;
        current = &children[at].1;
    }
    Some(current)
}

/// Field values for [`Store::create`](crate::Store::create), addressed by
/// dotted path.
///
/// # Example
///
/// ```
/// use strata_core::ObjectValues;
///
/// let values = ObjectValues::new()
///     .set("name", "anvil")
///     .set("dims.width", 40u32);
/// assert_eq!(values.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectValues {
    entries: Vec<(String, FieldValue)>,
}

impl ObjectValues {
    /// Creates an empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value at a dotted path.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.entries.push((path.into(), value.into()));
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[(String, FieldValue)] {
        &self.entries
    }
}

/// Resolves path-addressed values into the tag tree a record stores,
/// validating types against the model and completeness of required fields.
pub(crate) fn assemble(model: &Model, values: &ObjectValues) -> DbResult<BTreeMap<u16, FieldValue>> {
    let mut slots: Vec<(u16, FieldValue)> = Vec::with_capacity(values.len());
    for (path, value) in values.entries() {
        let resolved = model.resolve_path(path)?;
        check_value_type(resolved.leaf, value, path)?;
        insert_path(&mut slots, &resolved.tags, value.clone(), path)?;
    }
    let assembled: BTreeMap<u16, FieldValue> = slots.into_iter().collect();
    ensure_required(model, &assembled)?;
    Ok(assembled)
}

/// Checks that every required field is present, recursing into nested
/// groups that are set.
pub(crate) fn ensure_required(model: &Model, values: &BTreeMap<u16, FieldValue>) -> DbResult<()> {
    for def in model.fields() {
        check_presence(def, values.get(&def.tag()), def.name())?;
    }
    Ok(())
}

fn check_presence(def: &FieldDef, value: Option<&FieldValue>, path: &str) -> DbResult<()> {
    match value {
        None if def.is_required() => Err(DbError::Serialization(CodecError::invalid_structure(
            format!("missing required field `{path}`"),
        ))),
        None => Ok(()),
        Some(FieldValue::Nested(children)) => {
            for child in def.nested_fields() {
                let at = children.binary_search_by_key(&child.tag(), |(t, _)| *t).ok();
                let child_value = at.map(|i| &children[i].1);
                check_presence(child, child_value, &format!("{path}.{}", child.name()))?;
            }
            Ok(())
        }
        Some(_) => Ok(()),
    }
}

pub(crate) fn check_value_type(leaf: &FieldDef, value: &FieldValue, path: &str) -> DbResult<()> {
    if value.kind() == leaf.field_type() {
        Ok(())
    } else {
        Err(DbError::Serialization(CodecError::invalid_structure(
            format!(
                "field `{path}` expects {}, got {}",
                leaf.field_type().name(),
                value.kind().name()
            ),
        )))
    }
}

/// Inserts a value at a tag chain, materializing intermediate groups and
/// keeping each level sorted by tag.
pub(crate) fn insert_path(
    slots: &mut Vec<(u16, FieldValue)>,
    tags: &[u16],
    value: FieldValue,
    path: &str,
) -> DbResult<()> {
    let Some((first, rest)) = tags.split_first() else {
        return Err(DbError::invalid_argument(format!("empty path `{path}`")));
    };
    let position = slots.binary_search_by_key(first, |(t, _)| *t);
    if rest.is_empty() {
        return match position {
            Ok(_) => Err(DbError::invalid_argument(format!(
                "duplicate value for `{path}`"
            ))),
            Err(at) => {
                slots.insert(at, (*first, value));
                Ok(())
            }
        };
    }
    let at = match position {
        Ok(found) => found,
        Err(missing) => {
            slots.insert(missing, (*first, FieldValue::Nested(Vec::new())));
            missing
        }
    };
    let FieldValue::Nested(children) = &mut slots[at].1 else {
        return Err(DbError::invalid_argument(format!(
            "path `{path}` crosses a non-group field"
        )));
    };
    insert_path(children, rest, value, path)
}
