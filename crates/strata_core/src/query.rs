//! Index range queries.
//!
//! A [`Query`] names a model, one of its indexes, and a topic, and narrows
//! the scan with optional bounds over the index's leading fields. Bounds
//! follow index order: on a descending field the lower bound is the larger
//! logical value.

use std::ops::Bound;

use strata_codec::{append_key_field, FieldValue};
use strata_storage::{next_prefix, Direction, ScanRange};

use crate::error::{DbError, DbResult};
use crate::keys;
use crate::model::{IndexDef, Model};
use crate::object;

/// A declarative range query over one index.
///
/// # Example
///
/// ```
/// use strata_core::Query;
///
/// let query = Query::new("widget", "byName", "tenant-1")
///     .lower(["a"])
///     .upper(["b"])
///     .limit(10);
/// assert_eq!(query.model(), "widget");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) model: String,
    pub(crate) index: String,
    pub(crate) topic: String,
    pub(crate) lower: Bound<Vec<FieldValue>>,
    pub(crate) upper: Bound<Vec<FieldValue>>,
    pub(crate) limit: Option<usize>,
    pub(crate) direction: Direction,
}

impl Query {
    /// Creates an unbounded forward query over the whole index.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        index: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            index: index.into(),
            topic: topic.into(),
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            limit: None,
            direction: Direction::Forward,
        }
    }

    /// Restricts to entries whose leading fields equal `values`.
    #[must_use]
    pub fn matching<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let values: Vec<FieldValue> = values.into_iter().map(Into::into).collect();
        self.lower = Bound::Included(values.clone());
        self.upper = Bound::Included(values);
        self
    }

    /// Inclusive lower bound over the index's leading fields.
    #[must_use]
    pub fn lower<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.lower = Bound::Included(values.into_iter().map(Into::into).collect());
        self
    }

    /// Exclusive lower bound: entries matching `values` exactly are skipped.
    #[must_use]
    pub fn lower_exclusive<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.lower = Bound::Excluded(values.into_iter().map(Into::into).collect());
        self
    }

    /// Inclusive upper bound over the index's leading fields.
    #[must_use]
    pub fn upper<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.upper = Bound::Included(values.into_iter().map(Into::into).collect());
        self
    }

    /// Exclusive upper bound.
    #[must_use]
    pub fn upper_exclusive<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.upper = Bound::Excluded(values.into_iter().map(Into::into).collect());
        self
    }

    /// Caps the number of delivered objects. Without an explicit limit,
    /// `find` applies [`Config::default_find_limit`](crate::Config).
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Walks the index from its upper end down.
    #[must_use]
    pub const fn reverse(mut self) -> Self {
        self.direction = Direction::Reverse;
        self
    }

    /// The model name this query targets.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The index name this query scans.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The topic this query is confined to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// A resolved query: the keyspace to scan and the raw key range.
#[derive(Debug)]
pub(crate) struct QueryPlan {
    pub keyspace: String,
    pub range: ScanRange,
    pub direction: Direction,
}

impl QueryPlan {
    fn empty(keyspace: String, direction: Direction) -> Self {
        Self {
            keyspace,
            range: ScanRange::between(Bound::Excluded(Vec::new()), Bound::Excluded(Vec::new())),
            direction,
        }
    }
}

/// Resolves a query against its model into a concrete key range.
pub(crate) fn plan(model: &Model, query: &Query) -> DbResult<QueryPlan> {
    let Some(index) = model.index(&query.index) else {
        return Err(DbError::invalid_argument(format!(
            "unknown index `{}` on model `{}`",
            query.index,
            model.name()
        )));
    };
    let keyspace = model.index_keyspace(index);
    let base = keys::index_prefix(&query.topic, index.tag())?;

    let lower = match &query.lower {
        Bound::Unbounded => Bound::Included(base.clone()),
        Bound::Included(values) => {
            Bound::Included(encode_bound(model, index, &base, values)?)
        }
        Bound::Excluded(values) => {
            let encoded = encode_bound(model, index, &base, values)?;
            match next_prefix(&encoded) {
                Some(next) => Bound::Included(next),
                // prefixes embed a 0x00 topic terminator, so a successor
                // exists unless the whole key is 0xFF
                None => return Ok(QueryPlan::empty(keyspace, query.direction)),
            }
        }
    };
    let upper = match &query.upper {
        Bound::Unbounded => after_prefix(base),
        Bound::Included(values) => after_prefix(encode_bound(model, index, &base, values)?),
        Bound::Excluded(values) => Bound::Excluded(encode_bound(model, index, &base, values)?),
    };

    Ok(QueryPlan {
        keyspace,
        range: ScanRange::between(lower, upper),
        direction: query.direction,
    })
}

/// First key past every key starting with `encoded`, or unbounded when no
/// such key exists.
fn after_prefix(encoded: Vec<u8>) -> Bound<Vec<u8>> {
    match next_prefix(&encoded) {
        Some(next) => Bound::Excluded(next),
        None => Bound::Unbounded,
    }
}

fn encode_bound(
    model: &Model,
    index: &IndexDef,
    base: &[u8],
    values: &[FieldValue],
) -> DbResult<Vec<u8>> {
    if values.len() > index.fields().len() {
        return Err(DbError::invalid_argument(format!(
            "bound supplies {} values but index `{}` projects {} fields",
            values.len(),
            index.name(),
            index.fields().len()
        )));
    }
    let mut key = base.to_vec();
    for (value, field) in values.iter().zip(index.fields()) {
        let resolved = model.resolve_path(field.path())?;
        object::check_value_type(resolved.leaf, value, field.path())?;
        append_key_field(&mut key, value, field.order())?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use strata_codec::FieldType;

    use crate::model::{FieldDef, IndexDef};

    use super::*;

    fn model() -> Model {
        Model::builder("widget")
            .field(FieldDef::required(1, "name", FieldType::Text))
            .field(FieldDef::optional(2, "price", FieldType::UInt32))
            .index(IndexDef::on("byName", ["name"]).unique())
            .index(IndexDef::on("byNamePrice", ["name", "price"]))
            .build()
            .unwrap()
    }

    fn base_of(m: &Model, index: &str) -> Vec<u8> {
        keys::index_prefix("t", m.index(index).unwrap().tag()).unwrap()
    }

    #[test]
    fn unbounded_query_spans_the_index_prefix() {
        let m = model();
        let plan = plan(&m, &Query::new("widget", "byName", "t")).unwrap();
        assert_eq!(plan.keyspace, "i:widget:byName");

        let base = base_of(&m, "byName");
        let past = next_prefix(&base).unwrap();
        assert_eq!(plan.range.as_bounds().0, Bound::Included(base.as_slice()));
        assert_eq!(plan.range.as_bounds().1, Bound::Excluded(past.as_slice()));
    }

    #[test]
    fn inclusive_bounds_cover_extensions_of_the_upper_value() {
        let m = model();
        let query = Query::new("widget", "byName", "t").lower(["a"]).upper(["b"]);
        let plan = plan(&m, &query).unwrap();

        let mut lower = base_of(&m, "byName");
        lower.extend_from_slice(b"a\0");
        let mut upper = base_of(&m, "byName");
        upper.extend_from_slice(b"b\x01");
        assert_eq!(plan.range.as_bounds().0, Bound::Included(lower.as_slice()));
        assert_eq!(plan.range.as_bounds().1, Bound::Excluded(upper.as_slice()));
    }

    #[test]
    fn exclusive_lower_skips_exact_matches_and_their_extensions() {
        let m = model();
        let query = Query::new("widget", "byNamePrice", "t").lower_exclusive(["a"]);
        let plan = plan(&m, &query).unwrap();

        let mut after_a = base_of(&m, "byNamePrice");
        after_a.extend_from_slice(b"a\x01");
        assert_eq!(plan.range.as_bounds().0, Bound::Included(after_a.as_slice()));
    }

    #[test]
    fn matching_is_an_equality_range() {
        let m = model();
        let plan = plan(&m, &Query::new("widget", "byName", "t").matching(["a"])).unwrap();

        let mut lower = base_of(&m, "byName");
        lower.extend_from_slice(b"a\0");
        let mut upper = base_of(&m, "byName");
        upper.extend_from_slice(b"a\x01");
        assert_eq!(plan.range.as_bounds().0, Bound::Included(lower.as_slice()));
        assert_eq!(plan.range.as_bounds().1, Bound::Excluded(upper.as_slice()));
        assert!(!plan.range.is_empty());
    }

    #[test]
    fn empty_bound_values_behave_as_unbounded() {
        let m = model();
        let explicit = plan(
            &m,
            &Query::new("widget", "byName", "t")
                .lower(Vec::<FieldValue>::new())
                .upper(Vec::<FieldValue>::new()),
        )
        .unwrap();
        let implicit = plan(&m, &Query::new("widget", "byName", "t")).unwrap();
        assert_eq!(explicit.range.as_bounds(), implicit.range.as_bounds());
    }

    #[test]
    fn rejects_unknown_index_and_excess_values() {
        let m = model();
        assert!(matches!(
            plan(&m, &Query::new("widget", "nope", "t")),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            plan(
                &m,
                &Query::new("widget", "byName", "t").matching(["a", "b"])
            ),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rejects_mistyped_bound_values() {
        let m = model();
        let query = Query::new("widget", "byName", "t").matching([FieldValue::UInt32(5)]);
        assert!(matches!(plan(&m, &query), Err(DbError::Serialization(_))));
    }

    #[test]
    fn reverse_carries_into_the_plan() {
        let m = model();
        let plan = plan(&m, &Query::new("widget", "byName", "t").reverse()).unwrap();
        assert_eq!(plan.direction, Direction::Reverse);
    }

    #[test]
    fn successor_of_an_all_ff_prefix_is_unbounded() {
        assert_eq!(after_prefix(vec![0xFF, 0xFF]), Bound::Unbounded);
        assert_eq!(after_prefix(vec![0x01]), Bound::Excluded(vec![0x02]));
    }
}
