//! Registered models, keyed by name.

use std::collections::BTreeMap;

use crate::error::{DbError, DbResult};

use super::Model;

/// The set of models a store was opened with.
///
/// Populated once during [`Store::open`](crate::Store::open) and read-only
/// afterwards, so lookups need no synchronization.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Model>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model.
    ///
    /// Registering the same declaration twice is a no-op, so independent
    /// components can bring the same model without coordinating.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] when a different declaration is already
    /// registered under the same name.
    pub fn register(&mut self, model: Model) -> DbResult<()> {
        match self.models.get(model.name()) {
            Some(existing) if *existing == model => Ok(()),
            Some(_) => Err(DbError::schema(format!(
                "model `{}` is already registered with a different shape",
                model.name()
            ))),
            None => {
                self.models.insert(model.name().to_string(), model);
                Ok(())
            }
        }
    }

    /// Looks up a model, failing for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidArgument`] when no model with that name
    /// was registered.
    pub fn model(&self, name: &str) -> DbResult<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| DbError::invalid_argument(format!("unknown model `{name}`")))
    }

    /// Looks up a model by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Iterates the registered models in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether any model is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use strata_codec::FieldType;

    use super::super::FieldDef;
    use super::*;

    fn sample() -> Model {
        Model::builder("widget")
            .field(FieldDef::required(1, "name", FieldType::Text))
            .build()
            .unwrap()
    }

    #[test]
    fn registration_is_idempotent_for_identical_shapes() {
        let mut registry = ModelRegistry::new();
        registry.register(sample()).unwrap();
        registry.register(sample()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_shape_is_rejected() {
        let mut registry = ModelRegistry::new();
        registry.register(sample()).unwrap();

        let changed = Model::builder("widget")
            .field(FieldDef::required(1, "name", FieldType::Bytes))
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(changed),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn unknown_model_is_an_invalid_argument() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.model("ghost"),
            Err(DbError::InvalidArgument { .. })
        ));
    }
}
