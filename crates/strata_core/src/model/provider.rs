//! Bootstrap wiring between models and backend keyspaces.

use strata_storage::{Backend, Keyspace};

use crate::error::DbResult;

use super::Model;

/// A model together with the keyspaces it requires.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    model: Model,
}

impl ModelInfo {
    /// Wraps a built model.
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self { model }
    }

    /// The wrapped model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Unwraps the model.
    #[must_use]
    pub fn into_model(self) -> Model {
        self.model
    }

    /// Names of every keyspace this model stores data in: the primary
    /// keyspace, one per index, and the expiration keyspace when any index
    /// is a TTL index.
    #[must_use]
    pub fn keyspaces(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.model.indexes().len() + 2);
        names.push(self.model.primary_keyspace());
        for index in self.model.indexes() {
            names.push(self.model.index_keyspace(index));
        }
        if self.model.has_ttl_indexes() {
            names.push(self.model.ttl_keyspace());
        }
        names
    }

    /// Creates every required keyspace on `backend`, returning the handles
    /// in the order of [`ModelInfo::keyspaces`]. Creation is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Backend`](crate::DbError::Backend) when the
    /// backend rejects a keyspace.
    pub fn register_keyspaces<B: Backend>(&self, backend: &B) -> DbResult<Vec<Keyspace>> {
        let mut handles = Vec::new();
        for name in self.keyspaces() {
            handles.push(backend.create_keyspace(&name)?);
        }
        Ok(handles)
    }
}

impl From<Model> for ModelInfo {
    fn from(model: Model) -> Self {
        Self::new(model)
    }
}

/// A source of models handed to [`Store::open`](crate::Store::open).
///
/// Implementations exist for a single [`Model`] and for collections, so
/// call sites can pass whatever they assembled their schemas into.
pub trait ModelsProvider {
    /// The models this provider contributes.
    fn models(&self) -> Vec<ModelInfo>;
}

impl ModelsProvider for Model {
    fn models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo::new(self.clone())]
    }
}

impl ModelsProvider for Vec<Model> {
    fn models(&self) -> Vec<ModelInfo> {
        self.iter().cloned().map(ModelInfo::new).collect()
    }
}

impl ModelsProvider for [Model] {
    fn models(&self) -> Vec<ModelInfo> {
        self.iter().cloned().map(ModelInfo::new).collect()
    }
}

impl<T: ModelsProvider + ?Sized> ModelsProvider for &T {
    fn models(&self) -> Vec<ModelInfo> {
        (**self).models()
    }
}

#[cfg(test)]
mod tests {
    use strata_codec::FieldType;
    use strata_storage::MemoryBackend;

    use super::super::{FieldDef, IndexDef};
    use super::*;

    fn session() -> Model {
        Model::builder("session")
            .field(FieldDef::required(1, "token", FieldType::Text))
            .field(FieldDef::required(2, "expiresAt", FieldType::DateTime))
            .index(IndexDef::on("byToken", ["token"]).unique())
            .index(IndexDef::on("expiry", ["expiresAt"]).ttl())
            .build()
            .unwrap()
    }

    #[test]
    fn keyspaces_cover_primary_indexes_and_ttl() {
        let info = ModelInfo::new(session());
        assert_eq!(
            info.keyspaces(),
            vec![
                "m:session".to_string(),
                "i:session:byToken".to_string(),
                "i:session:expiry".to_string(),
                "ttl:session".to_string(),
            ]
        );
    }

    #[test]
    fn register_keyspaces_creates_them_all() {
        let backend = MemoryBackend::new();
        let info = ModelInfo::new(session());
        let handles = info.register_keyspaces(&backend).unwrap();
        assert_eq!(handles.len(), 4);
        assert!(backend.keyspace("ttl:session").is_ok());
    }

    #[test]
    fn providers_flatten_collections() {
        let models = vec![session()];
        assert_eq!(ModelsProvider::models(&models).len(), 1);
        assert_eq!(session().models().len(), 1);
    }
}
