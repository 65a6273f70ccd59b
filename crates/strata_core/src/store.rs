//! The store facade.
//!
//! [`Store`] owns a backend, the model registry, and the keyspace handles,
//! and exposes the whole engine surface: schema-checked CRUD, index
//! queries, and expiration reaping. Every mutating operation runs inside
//! one backend transaction, so an operation either lands completely or
//! not at all.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;

use tracing::{debug, warn};

use strata_codec::{decode_record, encode_record, DateTime, FieldValue, ObjectId, Record};
use strata_storage::{Backend, BackendView, Direction, Keyspace, ScanRange, StorageError};

use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::index::{self, EntrySet};
use crate::keys;
use crate::model::{Model, ModelRegistry, ModelsProvider};
use crate::mutation::{self, Mutation};
use crate::object::{self, Object, ObjectValues};
use crate::query::{self, Query};
use crate::ttl::{self, ReapSummary};
use crate::txn;

/// A schema-driven object store over an ordered key-value backend.
///
/// # Example
///
/// ```
/// use strata_codec::FieldType;
/// use strata_core::{Config, FieldDef, IndexDef, Model, ObjectValues, Store};
/// use strata_storage::MemoryBackend;
///
/// # fn main() -> strata_core::DbResult<()> {
/// let widget = Model::builder("widget")
///     .field(FieldDef::required(1, "name", FieldType::Text))
///     .index(IndexDef::on("byName", ["name"]).unique())
///     .build()?;
///
/// let store = Store::open(MemoryBackend::new(), widget, Config::default())?;
/// let id = store.create("widget", "tenant-1", ObjectValues::new().set("name", "anvil"))?;
/// let object = store.read("widget", "tenant-1", id)?;
/// assert_eq!(object.revision(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Store<B: Backend> {
    backend: B,
    registry: ModelRegistry,
    keyspaces: HashMap<String, Keyspace>,
    config: Config,
}

impl<B: Backend> Store<B> {
    /// Opens a store: registers every model the provider contributes and
    /// creates their keyspaces on the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] when two providers register the same
    /// model name with different shapes, and [`DbError::Backend`] when a
    /// keyspace cannot be created.
    pub fn open(backend: B, models: impl ModelsProvider, config: Config) -> DbResult<Self> {
        let mut registry = ModelRegistry::new();
        let mut keyspaces = HashMap::new();
        for info in models.models() {
            registry.register(info.model().clone())?;
            let names = info.keyspaces();
            let handles = info.register_keyspaces(&backend)?;
            for (name, handle) in names.into_iter().zip(handles) {
                keyspaces.insert(name, handle);
            }
        }
        debug!(models = registry.len(), "store opened");
        Ok(Self {
            backend,
            registry,
            keyspaces,
            config,
        })
    }

    /// The registered models.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn keyspace(&self, name: &str) -> DbResult<&Keyspace> {
        self.keyspaces
            .get(name)
            .ok_or_else(|| DbError::Backend(StorageError::keyspace_missing(name)))
    }

    /// Creates an object from path-addressed values and returns its id.
    ///
    /// The values are validated against the model, every satisfied index
    /// gains an entry, and unique indexes are checked before the primary
    /// record is written. All of it commits atomically.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Duplicate`] when a unique index already holds
    /// the written field values, [`DbError::Serialization`] for missing
    /// required fields or type mismatches, and
    /// [`DbError::InvalidArgument`] for unknown paths or a malformed
    /// topic.
    pub fn create(&self, model: &str, topic: &str, values: ObjectValues) -> DbResult<ObjectId> {
        keys::check_topic(topic)?;
        let model = self.registry.model(model)?;
        let assembled = object::assemble(model, &values)?;
        let id = ObjectId::new();
        let now = DateTime::now();

        let set = index::plan_entries(model, topic, &id, &assembled)?;
        let record = Record::new(1, now, assembled.into_iter().collect());
        let mut payload = encode_record(&record)?;
        ttl::append_mark(&mut payload, &set.expirations)?;
        let primary = self.keyspace(&model.primary_keyspace())?;
        let key = keys::primary_key(topic, &id)?;

        txn::with_write(&self.backend, |txn| {
            for entry in &set.entries {
                let ks = self.keyspace(&entry.keyspace)?;
                if entry.unique {
                    if !txn.insert_if_absent(ks, &entry.key, &entry.value)? {
                        return Err(DbError::duplicate(entry.index_name.clone()));
                    }
                } else {
                    txn.put(ks, &entry.key, &entry.value)?;
                }
            }
            txn.put(primary, &key, &payload)
        })?;
        debug!(model = model.name(), topic, id = %id, "object created");
        Ok(id)
    }

    /// Reads an object by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when no record exists or the object
    /// has expired.
    pub fn read(&self, model: &str, topic: &str, id: ObjectId) -> DbResult<Object> {
        keys::check_topic(topic)?;
        let model = self.registry.model(model)?;
        let primary = self.keyspace(&model.primary_keyspace())?;
        let key = keys::primary_key(topic, &id)?;

        let Some(stored) = self.backend.get(primary, &key)? else {
            return Err(DbError::not_found(model.name(), topic, id));
        };
        let Some(record) = decode_stored(&stored, DateTime::now())? else {
            return Err(DbError::not_found(model.name(), topic, id));
        };
        Ok(Object::from_record(id, record))
    }

    /// Applies a mutation to an object and returns its new state.
    ///
    /// Index entries move atomically with the record: an observer sees
    /// either the old field values in every index or the new ones, never
    /// a mix. The revision increments and `updated_at` is refreshed, even
    /// for an empty mutation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for missing or expired objects,
    /// [`DbError::Duplicate`] when the mutated values collide in a unique
    /// index, and [`DbError::Conflict`] when a concurrent writer won.
    pub fn update(
        &self,
        model: &str,
        topic: &str,
        id: ObjectId,
        mutation: &Mutation,
    ) -> DbResult<Object> {
        keys::check_topic(topic)?;
        let model = self.registry.model(model)?;
        let primary = self.keyspace(&model.primary_keyspace())?;
        let key = keys::primary_key(topic, &id)?;
        let now = DateTime::now();

        let updated = txn::with_write(&self.backend, |txn| {
            let Some(stored) = txn.get(primary, &key)? else {
                return Err(DbError::not_found(model.name(), topic, id));
            };
            let Some(record) = decode_stored(&stored, now)? else {
                return Err(DbError::not_found(model.name(), topic, id));
            };
            let old_values: BTreeMap<u16, FieldValue> = record.fields.into_iter().collect();
            let mut new_values = old_values.clone();
            mutation::apply(model, &mut new_values, mutation)?;

            let old_set = index::plan_entries(model, topic, &id, &old_values)?;
            let EntrySet {
                entries: new_entries,
                expirations,
            } = index::plan_entries(model, topic, &id, &new_values)?;
            let diff = index::diff_entries(old_set.entries, new_entries);

            for entry in &diff.removals {
                let ks = self.keyspace(&entry.keyspace)?;
                txn.delete(ks, &entry.key)?;
            }
            for entry in &diff.inserts {
                let ks = self.keyspace(&entry.keyspace)?;
                if entry.unique {
                    if !txn.insert_if_absent(ks, &entry.key, &entry.value)? {
                        return Err(DbError::duplicate(entry.index_name.clone()));
                    }
                } else {
                    txn.put(ks, &entry.key, &entry.value)?;
                }
            }
            for entry in &diff.rewrites {
                let ks = self.keyspace(&entry.keyspace)?;
                txn.put(ks, &entry.key, &entry.value)?;
            }

            let next = Record::new(record.revision + 1, now, new_values.into_iter().collect());
            let mut payload = encode_record(&next)?;
            ttl::append_mark(&mut payload, &expirations)?;
            txn.put(primary, &key, &payload)?;
            Ok(Object::from_record(id, next))
        })?;
        debug!(
            model = model.name(),
            topic,
            id = %id,
            revision = updated.revision(),
            "object updated"
        );
        Ok(updated)
    }

    /// Deletes an object, its index entries, and its expiration entries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when no record exists or the object
    /// has expired.
    pub fn delete(&self, model: &str, topic: &str, id: ObjectId) -> DbResult<()> {
        keys::check_topic(topic)?;
        let model = self.registry.model(model)?;
        self.delete_decoded(model, topic, id, false)?;
        debug!(model = model.name(), topic, id = %id, "object deleted");
        Ok(())
    }

    fn delete_decoded(
        &self,
        model: &Model,
        topic: &str,
        id: ObjectId,
        allow_expired: bool,
    ) -> DbResult<()> {
        let primary = self.keyspace(&model.primary_keyspace())?;
        let key = keys::primary_key(topic, &id)?;
        let now = DateTime::now();

        txn::with_write(&self.backend, |txn| {
            let Some(stored) = txn.get(primary, &key)? else {
                return Err(DbError::not_found(model.name(), topic, id));
            };
            let (payload, expirations) = ttl::split_mark(&stored)?;
            if !allow_expired && ttl::is_expired(&expirations, now) {
                return Err(DbError::not_found(model.name(), topic, id));
            }
            let record = decode_record(payload)?;
            let values: BTreeMap<u16, FieldValue> = record.fields.into_iter().collect();
            let set = index::plan_entries(model, topic, &id, &values)?;
            for entry in &set.entries {
                let ks = self.keyspace(&entry.keyspace)?;
                txn.delete(ks, &entry.key)?;
            }
            txn.delete(primary, &key)
        })
    }

    /// Runs a query and passes each live object to `visit`, in index
    /// order, until the limit is reached or `visit` returns `Ok(false)`.
    ///
    /// The scan and the primary lookups share one snapshot. Expired
    /// objects are skipped and do not count against the limit. Without an
    /// explicit limit, [`Config::default_find_limit`] applies.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidArgument`] for unknown models, indexes,
    /// or malformed bounds, and propagates the first error `visit`
    /// returns.
    pub fn find_each<F>(&self, query: &Query, mut visit: F) -> DbResult<()>
    where
        F: FnMut(Object) -> DbResult<bool>,
    {
        keys::check_topic(&query.topic)?;
        let model = self.registry.model(&query.model)?;
        let plan = query::plan(model, query)?;
        if plan.range.is_empty() {
            return Ok(());
        }
        let index_ks = self.keyspace(&plan.keyspace)?;
        let primary_ks = self.keyspace(&model.primary_keyspace())?;
        let view = self.backend.view()?;
        let now = DateTime::now();
        let mut remaining = query.limit.unwrap_or(self.config.default_find_limit);
        if remaining == 0 {
            return Ok(());
        }

        for item in view.scan(index_ks, &plan.range, plan.direction)? {
            let (_key, stored) = item?;
            let (id, expirations) = parse_entry(&stored)?;
            if ttl::is_expired(&expirations, now) {
                continue;
            }
            let primary_key = keys::primary_key(&query.topic, &id)?;
            let Some(stored_record) = view.get(primary_ks, &primary_key)? else {
                debug!(model = %query.model, id = %id, "index entry without a primary record, skipping");
                continue;
            };
            let Some(record) = decode_stored(&stored_record, now)? else {
                continue;
            };
            remaining -= 1;
            let proceed = visit(Object::from_record(id, record))?;
            if !proceed || remaining == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Runs a query and collects the results.
    ///
    /// # Errors
    ///
    /// See [`Store::find_each`].
    pub fn find(&self, query: &Query) -> DbResult<Vec<Object>> {
        let mut results = Vec::new();
        self.find_each(query, |object| {
            results.push(object);
            Ok(true)
        })?;
        Ok(results)
    }

    /// Runs a query and returns the first live match, if any.
    ///
    /// # Errors
    ///
    /// See [`Store::find_each`].
    pub fn find_one(&self, query: &Query) -> DbResult<Option<Object>> {
        let mut found = None;
        self.find_each(query, |object| {
            found = Some(object);
            Ok(false)
        })?;
        Ok(found)
    }

    /// Counts live index entries matching the query, without resolving
    /// primary records. An explicit limit caps the count; otherwise the
    /// whole range is counted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidArgument`] for unknown models, indexes,
    /// or malformed bounds.
    pub fn count(&self, query: &Query) -> DbResult<usize> {
        keys::check_topic(&query.topic)?;
        let model = self.registry.model(&query.model)?;
        let plan = query::plan(model, query)?;
        if plan.range.is_empty() {
            return Ok(0);
        }
        let index_ks = self.keyspace(&plan.keyspace)?;
        let view = self.backend.view()?;
        let now = DateTime::now();

        let mut total = 0;
        for item in view.scan(index_ks, &plan.range, plan.direction)? {
            if query.limit.is_some_and(|cap| total >= cap) {
                break;
            }
            let (_key, stored) = item?;
            let (_id, expirations) = parse_entry(&stored)?;
            if !ttl::is_expired(&expirations, now) {
                total += 1;
            }
        }
        Ok(total)
    }

    /// Deletes every live object matching the query and returns how many
    /// went away. Each object is deleted in its own transaction; objects
    /// that vanish between the scan and their deletion are skipped.
    ///
    /// # Errors
    ///
    /// See [`Store::count`]; also propagates the first deletion failure
    /// other than [`DbError::NotFound`].
    pub fn delete_many(&self, query: &Query) -> DbResult<usize> {
        keys::check_topic(&query.topic)?;
        let model = self.registry.model(&query.model)?;
        let plan = query::plan(model, query)?;
        let mut ids = Vec::new();
        if !plan.range.is_empty() {
            let index_ks = self.keyspace(&plan.keyspace)?;
            let view = self.backend.view()?;
            let now = DateTime::now();
            for item in view.scan(index_ks, &plan.range, plan.direction)? {
                if query.limit.is_some_and(|cap| ids.len() >= cap) {
                    break;
                }
                let (_key, stored) = item?;
                let (id, expirations) = parse_entry(&stored)?;
                if !ttl::is_expired(&expirations, now) {
                    ids.push(id);
                }
            }
        }

        let mut deleted = 0;
        for id in ids {
            match self.delete_decoded(model, &query.topic, id, false) {
                Ok(()) => deleted += 1,
                Err(DbError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        debug!(model = %query.model, topic = %query.topic, deleted, "objects deleted by query");
        Ok(deleted)
    }

    /// Reaps objects whose expiration instant has passed, deleting them
    /// like [`Store::delete`] would. Also removes expiration entries
    /// whose object is already gone. Work per model is capped by
    /// [`Config::reap_batch_limit`].
    ///
    /// # Errors
    ///
    /// Propagates backend failures; a [`DbError::Conflict`] from a
    /// concurrent writer aborts the run and the next run picks up where
    /// this one stopped.
    pub fn reap_expired(&self) -> DbResult<ReapSummary> {
        self.reap_expired_at(DateTime::now())
    }

    /// Like [`Store::reap_expired`], with an explicit notion of now.
    pub fn reap_expired_at(&self, now: DateTime) -> DbResult<ReapSummary> {
        let mut summary = ReapSummary::default();
        for model in self.registry.iter() {
            if !model.has_ttl_indexes() {
                continue;
            }
            let ttl_ks = self.keyspace(&model.ttl_keyspace())?;
            let upper = match now.as_millis().checked_add(1) {
                Some(next) => Bound::Excluded(next.to_be_bytes().to_vec()),
                None => Bound::Unbounded,
            };
            let range = ScanRange::between(Bound::Unbounded, upper);

            let mut candidates = Vec::new();
            {
                let view = self.backend.view()?;
                for item in view.scan(ttl_ks, &range, Direction::Forward)? {
                    if candidates.len() >= self.config.reap_batch_limit {
                        break;
                    }
                    let (key, _value) = item?;
                    candidates.push(keys::split_ttl_key(&key)?);
                }
            }

            for (expires_at, topic, id) in candidates {
                match self.delete_decoded(model, &topic, id, true) {
                    Ok(()) => summary.note_reaped(model.name()),
                    Err(DbError::NotFound { .. }) => {
                        warn!(
                            model = model.name(),
                            id = %id,
                            "expiration entry without an object, removing"
                        );
                        let key = keys::ttl_key(expires_at, &topic, &id)?;
                        self.backend.delete(ttl_ks, &key)?;
                        summary.stale += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        if summary.total_reaped() > 0 || summary.stale > 0 {
            debug!(
                reaped = summary.total_reaped(),
                stale = summary.stale,
                "expired objects reaped"
            );
        }
        Ok(summary)
    }
}

impl<B: Backend> fmt::Debug for Store<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("models", &self.registry.len())
            .field("keyspaces", &self.keyspaces.len())
            .finish_non_exhaustive()
    }
}

fn parse_entry(stored: &[u8]) -> DbResult<(ObjectId, Vec<DateTime>)> {
    let (head, expirations) = ttl::split_mark(stored)?;
    let id = ObjectId::from_encoded(head)?;
    Ok((id, expirations))
}

fn decode_stored(stored: &[u8], now: DateTime) -> DbResult<Option<Record>> {
    let (payload, expirations) = ttl::split_mark(stored)?;
    if ttl::is_expired(&expirations, now) {
        return Ok(None);
    }
    Ok(Some(decode_record(payload)?))
}

#[cfg(test)]
mod tests {
    use strata_codec::{FieldType, FieldValue};
    use strata_storage::MemoryBackend;

    use crate::model::{FieldDef, IndexDef};

    use super::*;

    fn widget() -> Model {
        Model::builder("widget")
            .field(FieldDef::required(1, "name", FieldType::Text))
            .field(FieldDef::optional(2, "price", FieldType::UInt32))
            .index(IndexDef::on("byName", ["name"]).unique())
            .index(IndexDef::on("byPrice", ["price"]))
            .build()
            .unwrap()
    }

    fn open_store() -> Store<MemoryBackend> {
        Store::open(MemoryBackend::new(), widget(), Config::default()).unwrap()
    }

    #[test]
    fn create_then_read_round_trips() {
        let store = open_store();
        let id = store
            .create(
                "widget",
                "t1",
                ObjectValues::new().set("name", "anvil").set("price", 5u32),
            )
            .unwrap();

        let object = store.read("widget", "t1", id).unwrap();
        assert_eq!(object.id(), id);
        assert_eq!(object.revision(), 1);
        assert_eq!(object.value(1), Some(&FieldValue::Text("anvil".into())));
        assert_eq!(object.value(2), Some(&FieldValue::UInt32(5)));
    }

    #[test]
    fn read_of_unknown_id_is_not_found() {
        let store = open_store();
        let ghost = ObjectId::new();
        assert!(matches!(
            store.read("widget", "t1", ghost),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let store = open_store();
        assert!(matches!(
            store.create("gadget", "t1", ObjectValues::new().set("name", "x")),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn malformed_topics_are_rejected() {
        let store = open_store();
        let values = ObjectValues::new().set("name", "x");
        assert!(matches!(
            store.create("widget", "", values.clone()),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            store.create("widget", "a\0b", values),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn failed_create_leaves_no_trace() {
        let store = open_store();
        store
            .create("widget", "t1", ObjectValues::new().set("name", "anvil"))
            .unwrap();
        // second create hits the unique byName index and rolls back
        let err = store
            .create(
                "widget",
                "t1",
                ObjectValues::new().set("name", "anvil").set("price", 3u32),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate { index } if index == "byName"));

        let by_price = Query::new("widget", "byPrice", "t1");
        assert_eq!(store.count(&by_price).unwrap(), 0);
    }

    #[test]
    fn debug_stays_compact() {
        let store = open_store();
        let rendered = format!("{store:?}");
        assert!(rendered.contains("Store"));
        assert!(rendered.contains("models"));
    }
}
