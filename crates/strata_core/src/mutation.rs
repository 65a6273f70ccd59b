//! Field mutations applied by [`Store::update`](crate::Store::update).

use std::collections::BTreeMap;

use strata_codec::{CodecError, FieldType, FieldValue};

use crate::error::{DbError, DbResult};
use crate::model::Model;
use crate::object;

/// One field operation inside a [`Mutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Store a value at the path, replacing any existing value.
    Set {
        /// Dotted field path.
        path: String,
        /// Value to store.
        value: FieldValue,
    },
    /// Remove the value at the path. Only legal for optional fields.
    Unset {
        /// Dotted field path.
        path: String,
    },
    /// Add a signed delta to an integer field that is currently set.
    Inc {
        /// Dotted field path.
        path: String,
        /// Amount to add, which may be negative.
        delta: i64,
    },
}

/// An ordered list of field operations, applied atomically and in order
/// by a single update.
///
/// # Example
///
/// ```
/// use strata_core::Mutation;
///
/// let mutation = Mutation::new()
///     .set("name", "anvil mk2")
///     .inc("stock", -1)
///     .unset("note");
/// assert_eq!(mutation.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    ops: Vec<MutationOp>,
}

impl Mutation {
    /// Creates an empty mutation. Applying it still bumps the revision.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a set operation.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.ops.push(MutationOp::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Appends an unset operation.
    #[must_use]
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(MutationOp::Unset { path: path.into() });
        self
    }

    /// Appends an increment operation.
    #[must_use]
    pub fn inc(mut self, path: impl Into<String>, delta: i64) -> Self {
        self.ops.push(MutationOp::Inc {
            path: path.into(),
            delta,
        });
        self
    }

    /// The operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[MutationOp] {
        &self.ops
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the mutation holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Applies every operation in order onto `values`, then re-checks that all
/// required fields are still present.
pub(crate) fn apply(
    model: &Model,
    values: &mut BTreeMap<u16, FieldValue>,
    mutation: &Mutation,
) -> DbResult<()> {
    for op in &mutation.ops {
        match op {
            MutationOp::Set { path, value } => {
                let resolved = model.resolve_path(path)?;
                object::check_value_type(resolved.leaf, value, path)?;
                apply_set(values, &resolved.tags, value.clone(), path)?;
            }
            MutationOp::Unset { path } => {
                let resolved = model.resolve_path(path)?;
                if resolved.leaf.is_required() {
                    return Err(DbError::invalid_argument(format!(
                        "cannot unset required field `{path}`"
                    )));
                }
                apply_unset(values, &resolved.tags, path)?;
            }
            MutationOp::Inc { path, delta } => {
                let resolved = model.resolve_path(path)?;
                if !is_integer(resolved.leaf.field_type()) {
                    return Err(DbError::Serialization(CodecError::invalid_structure(
                        format!(
                            "field `{path}` of type {} cannot be incremented",
                            resolved.leaf.field_type().name()
                        ),
                    )));
                }
                let Some(value) = lookup_tags_mut(values, &resolved.tags) else {
                    return Err(DbError::invalid_argument(format!(
                        "cannot increment unset field `{path}`"
                    )));
                };
                increment(value, *delta, path)?;
            }
        }
    }
    object::ensure_required(model, values)
}

const fn is_integer(field_type: FieldType) -> bool {
    matches!(
        field_type,
        FieldType::Int8
            | FieldType::Int16
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt8
            | FieldType::UInt16
            | FieldType::UInt32
            | FieldType::UInt64
    )
}

fn apply_set(
    values: &mut BTreeMap<u16, FieldValue>,
    tags: &[u16],
    value: FieldValue,
    path: &str,
) -> DbResult<()> {
    let Some((first, rest)) = tags.split_first() else {
        return Err(DbError::invalid_argument(format!("empty path `{path}`")));
    };
    if rest.is_empty() {
        values.insert(*first, value);
        return Ok(());
    }
    let slot = values
        .entry(*first)
        .or_insert_with(|| FieldValue::Nested(Vec::new()));
    let FieldValue::Nested(children) = slot else {
        return Err(DbError::invalid_argument(format!(
            "path `{path}` crosses a non-group field"
        )));
    };
    set_in_slots(children, rest, value, path)
}

fn set_in_slots(
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
        match position {
            Ok(at) => slots[at].1 = value,
            Err(at) => slots.insert(at, (*first, value)),
        }
        return Ok(());
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
    set_in_slots(children, rest, value, path)
}

fn apply_unset(values: &mut BTreeMap<u16, FieldValue>, tags: &[u16], path: &str) -> DbResult<()> {
    let Some((first, rest)) = tags.split_first() else {
        return Err(DbError::invalid_argument(format!("empty path `{path}`")));
    };
    if rest.is_empty() {
        values.remove(first);
        return Ok(());
    }
    let Some(slot) = values.get_mut(first) else {
        return Ok(());
    };
    let FieldValue::Nested(children) = slot else {
        return Err(DbError::invalid_argument(format!(
            "path `{path}` crosses a non-group field"
        )));
    };
    unset_in_slots(children, rest, path)
}

fn unset_in_slots(slots: &mut Vec<(u16, FieldValue)>, tags: &[u16], path: &str) -> DbResult<()> {
    let Some((first, rest)) = tags.split_first() else {
        return Err(DbError::invalid_argument(format!("empty path `{path}`")));
    };
    let Ok(at) = slots.binary_search_by_key(first, |(t, _)| *t) else {
        return Ok(());
    };
    if rest.is_empty() {
        slots.remove(at);
        return Ok(());
    }
    let FieldValue::Nested(children) = &mut slots[at].1 else {
        return Err(DbError::invalid_argument(format!(
            "path `{path}` crosses a non-group field"
        )));
    };
    unset_in_slots(children, rest, path)
}

fn lookup_tags_mut<'a>(
    values: &'a mut BTreeMap<u16, FieldValue>,
    tags: &[u16],
) -> Option<&'a mut FieldValue> {
    let (first, rest) = tags.split_first()?;
    let mut current = values.get_mut(first)?;
    for tag in rest {
        let FieldValue::Nested(children) = current else {
            return None;
        };
        let at = children.binary_search_by_key(tag, |(t, _)| *t).ok()?;
        current = &mut children[at].1;
    }
    Some(current)
}

fn increment(value: &mut FieldValue, delta: i64, path: &str) -> DbResult<()> {
    let overflow = || {
        DbError::Serialization(CodecError::invalid_structure(format!(
            "increment overflows field `{path}`"
        )))
    };
    match value {
        FieldValue::Int8(v) => {
            let next = i64::from(*v).checked_add(delta).ok_or_else(overflow)?;
            *v = i8::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::Int16(v) => {
            let next = i64::from(*v).checked_add(delta).ok_or_else(overflow)?;
            *v = i16::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::Int32(v) => {
            let next = i64::from(*v).checked_add(delta).ok_or_else(overflow)?;
            *v = i32::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::Int64(v) => {
            *v = v.checked_add(delta).ok_or_else(overflow)?;
        }
        FieldValue::UInt8(v) => {
            let next = shift_unsigned(u64::from(*v), delta).ok_or_else(overflow)?;
            *v = u8::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::UInt16(v) => {
            let next = shift_unsigned(u64::from(*v), delta).ok_or_else(overflow)?;
            *v = u16::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::UInt32(v) => {
            let next = shift_unsigned(u64::from(*v), delta).ok_or_else(overflow)?;
            *v = u32::try_from(next).map_err(|_| overflow())?;
        }
        FieldValue::UInt64(v) => {
            *v = shift_unsigned(*v, delta).ok_or_else(overflow)?;
        }
        other => {
            return Err(DbError::Serialization(CodecError::invalid_structure(
                format!(
                    "field `{path}` of type {} cannot be incremented",
                    other.kind().name()
                ),
            )));
        }
    }
    Ok(())
}

const fn shift_unsigned(current: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        current.checked_add(delta.unsigned_abs())
    } else {
        current.checked_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use strata_codec::FieldType;

    use crate::model::FieldDef;
    use crate::object::{assemble, ObjectValues};

    use super::*;

    fn counter_model() -> Model {
        Model::builder("counter")
            .field(FieldDef::required(1, "name", FieldType::Text))
            .field(FieldDef::required(2, "hits", FieldType::UInt32))
            .field(FieldDef::optional(3, "note", FieldType::Text))
            .field(FieldDef::optional_nested(
                4,
                "extra",
                [
                    FieldDef::required(1, "kind", FieldType::Text),
                    FieldDef::optional(2, "weight", FieldType::Int16),
                ],
            ))
            .build()
            .unwrap()
    }

    fn base_values() -> BTreeMap<u16, FieldValue> {
        let model = counter_model();
        let values = ObjectValues::new()
            .set("name", "page")
            .set("hits", 7u32)
            .set("note", "seed");
        assemble(&model, &values).unwrap()
    }

    #[test]
    fn set_replaces_and_creates_nested() {
        let model = counter_model();
        let mut values = base_values();
        let mutation = Mutation::new()
            .set("name", "page-2")
            .set("extra.kind", "beta")
            .set("extra.weight", FieldValue::Int16(-3));
        apply(&model, &mut values, &mutation).unwrap();

        assert_eq!(values[&1], FieldValue::Text("page-2".into()));
        let extra = values[&4].as_nested().unwrap();
        assert_eq!(extra[0], (1, FieldValue::Text("beta".into())));
        assert_eq!(extra[1], (2, FieldValue::Int16(-3)));
    }

    #[test]
    fn set_must_complete_required_group_children() {
        let model = counter_model();
        let mut values = base_values();
        // extra.weight alone leaves required extra.kind missing
        let mutation = Mutation::new().set("extra.weight", FieldValue::Int16(1));
        assert!(matches!(
            apply(&model, &mut values, &mutation),
            Err(DbError::Serialization(_))
        ));
    }

    #[test]
    fn unset_removes_optional_only() {
        let model = counter_model();
        let mut values = base_values();
        apply(&model, &mut values, &Mutation::new().unset("note")).unwrap();
        assert!(!values.contains_key(&3));

        // unsetting an absent optional field is a no-op
        apply(&model, &mut values, &Mutation::new().unset("note")).unwrap();

        assert!(matches!(
            apply(&model, &mut values, &Mutation::new().unset("hits")),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn inc_applies_checked_arithmetic() {
        let model = counter_model();
        let mut values = base_values();
        apply(&model, &mut values, &Mutation::new().inc("hits", 3)).unwrap();
        assert_eq!(values[&2], FieldValue::UInt32(10));

        apply(&model, &mut values, &Mutation::new().inc("hits", -10)).unwrap();
        assert_eq!(values[&2], FieldValue::UInt32(0));

        assert!(matches!(
            apply(&model, &mut values, &Mutation::new().inc("hits", -1)),
            Err(DbError::Serialization(_))
        ));
    }

    #[test]
    fn inc_rejects_unset_and_non_integer_fields() {
        let model = counter_model();
        let mut values = base_values();
        assert!(matches!(
            apply(&model, &mut values, &Mutation::new().inc("extra.weight", 1)),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            apply(&model, &mut values, &Mutation::new().inc("name", 1)),
            Err(DbError::Serialization(_))
        ));
    }

    #[test]
    fn unknown_path_is_invalid_argument() {
        let model = counter_model();
        let mut values = base_values();
        assert!(matches!(
            apply(&model, &mut values, &Mutation::new().set("bogus", 1u32)),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn empty_mutation_leaves_values_untouched() {
        let model = counter_model();
        let mut values = base_values();
        let before = values.clone();
        apply(&model, &mut values, &Mutation::new()).unwrap();
        assert_eq!(values, before);
    }

    #[test]
    fn ops_apply_in_order() {
        let model = counter_model();
        let mut values = base_values();
        let mutation = Mutation::new().inc("hits", 5).set("hits", 100u32).inc("hits", 1);
        apply(&model, &mut values, &mutation).unwrap();
        assert_eq!(values[&2], FieldValue::UInt32(101));
    }
}
