//! Model declarations: typed fields, secondary indexes, and validation.
//!
//! A [`Model`] is built once at startup through [`Model::builder`] and is
//! immutable afterwards. Building validates the whole declaration, so any
//! model that exists is safe to encode against.

mod provider;
mod registry;

pub use provider::{ModelInfo, ModelsProvider};
pub use registry::ModelRegistry;

use strata_codec::{FieldType, SortOrder};

use crate::error::{DbError, DbResult};

/// A typed field declaration inside a [`Model`].
///
/// Tags are the stable wire identity of a field; names exist for callers
/// and can be renamed freely as long as the tag stays put.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    tag: u16,
    field_type: FieldType,
    required: bool,
    nested: Vec<FieldDef>,
}

impl FieldDef {
    /// Declares a required scalar field.
    #[must_use]
    pub fn required(tag: u16, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            tag,
            field_type,
            required: true,
            nested: Vec::new(),
        }
    }

    /// Declares an optional scalar field.
    #[must_use]
    pub fn optional(tag: u16, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            tag,
            field_type,
            required: false,
            nested: Vec::new(),
        }
    }

    /// Declares a required nested group with the given child fields.
    #[must_use]
    pub fn nested(
        tag: u16,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDef>,
    ) -> Self {
        Self {
            name: name.into(),
            tag,
            field_type: FieldType::Nested,
            required: true,
            nested: fields.into_iter().collect(),
        }
    }

    /// Declares an optional nested group with the given child fields.
    #[must_use]
    pub fn optional_nested(
        tag: u16,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDef>,
    ) -> Self {
        Self {
            required: false,
            ..Self::nested(tag, name, fields)
        }
    }

    /// The field name, unique among its siblings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire tag, unique among its siblings.
    #[must_use]
    pub const fn tag(&self) -> u16 {
        self.tag
    }

    /// The declared value type.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the field must be present on every stored object.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Child declarations of a nested group, empty for scalar fields.
    #[must_use]
    pub fn nested_fields(&self) -> &[FieldDef] {
        &self.nested
    }
}

/// One projected field inside an [`IndexDef`], with its sort direction.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexField {
    path: String,
    order: SortOrder,
}

impl IndexField {
    /// Projects `path` in ascending order.
    #[must_use]
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Projects `path` in descending order.
    #[must_use]
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: SortOrder::Descending,
        }
    }

    /// The dotted field path this projection reads.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The sort direction applied when encoding the key component.
    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }
}

impl From<&str> for IndexField {
    fn from(path: &str) -> Self {
        Self::asc(path)
    }
}

impl From<String> for IndexField {
    fn from(path: String) -> Self {
        Self::asc(path)
    }
}

/// A secondary index declaration.
///
/// # Example
///
/// ```
/// use strata_core::{IndexDef, IndexField};
///
/// let by_name = IndexDef::on("byName", ["name"]).unique();
/// let by_price = IndexDef::on("byPrice", [IndexField::desc("price")]);
/// assert!(by_name.is_unique());
/// assert!(!by_price.is_unique());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    name: String,
    fields: Vec<IndexField>,
    unique: bool,
    ttl: bool,
    tag: u32,
}

impl IndexDef {
    /// Declares an index over the given field paths.
    ///
    /// Plain strings project ascending; use [`IndexField::desc`] for
    /// descending components.
    #[must_use]
    pub fn on<I, F>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<IndexField>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            ttl: false,
            tag: 0,
        }
    }

    /// Marks the index unique: at most one live object per field-value
    /// combination, enforced atomically on create and update.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index as a TTL index. Its leading field must be a required
    /// `DateTime`; objects expire once that instant passes.
    #[must_use]
    pub const fn ttl(mut self) -> Self {
        self.ttl = true;
        self
    }

    /// The index name, unique within its model.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The projected fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the index drives expiration.
    #[must_use]
    pub const fn is_ttl(&self) -> bool {
        self.ttl
    }

    /// Stable wire tag, derived from the model and index names at build
    /// time. Renaming either changes the tag and therefore the key layout.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        self.tag
    }
}

/// A resolved dotted path: the tag chain to walk and the leaf declaration.
pub(crate) struct ResolvedPath<'a> {
    pub tags: Vec<u16>,
    pub leaf: &'a FieldDef,
    /// True when every segment on the path is required, which guarantees
    /// the leaf is present on every valid object.
    pub fully_required: bool,
}

/// Schema and index declarations for one object type.
///
/// # Example
///
/// ```
/// use strata_codec::FieldType;
/// use strata_core::{FieldDef, IndexDef, Model};
///
/// let widget = Model::builder("widget")
///     .field(FieldDef::required(1, "name", FieldType::Text))
///     .field(FieldDef::optional(2, "price", FieldType::UInt32))
///     .index(IndexDef::on("byName", ["name"]).unique())
///     .build()
///     .unwrap();
/// assert_eq!(widget.name(), "widget");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    fields: Vec<FieldDef>,
    indexes: Vec<IndexDef>,
}

impl Model {
    /// Starts building a model with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// The model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level field declarations.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Index declarations.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.name == name)
    }

    /// Keyspace holding this model's primary records.
    #[must_use]
    pub fn primary_keyspace(&self) -> String {
        format!("m:{}", self.name)
    }

    /// Keyspace holding entries for the given index.
    #[must_use]
    pub fn index_keyspace(&self, index: &IndexDef) -> String {
        format!("i:{}:{}", self.name, index.name)
    }

    /// Keyspace holding this model's expiration entries.
    #[must_use]
    pub fn ttl_keyspace(&self) -> String {
        format!("ttl:{}", self.name)
    }

    /// Whether any index drives expiration.
    #[must_use]
    pub fn has_ttl_indexes(&self) -> bool {
        self.indexes.iter().any(IndexDef::is_ttl)
    }

    /// The TTL indexes in declaration order.
    pub(crate) fn ttl_indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.iter().filter(|idx| idx.ttl)
    }

    /// Resolves a dotted path to its tag chain and leaf declaration.
    pub(crate) fn resolve_path(&self, path: &str) -> DbResult<ResolvedPath<'_>> {
        resolve_in(&self.name, &self.fields, path)
    }
}

fn resolve_in<'a>(
    model_name: &str,
    fields: &'a [FieldDef],
    path: &str,
) -> DbResult<ResolvedPath<'a>> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, groups)) = segments.split_last() else {
        return Err(DbError::invalid_argument("empty field path"));
    };

    let mut current = fields;
    let mut tags = Vec::with_capacity(segments.len());
    let mut fully_required = true;
    for segment in groups {
        let def = find_field(model_name, current, segment, path)?;
        if def.field_type != FieldType::Nested {
            return Err(DbError::invalid_argument(format!(
                "field `{segment}` in path `{path}` is not a nested group"
            )));
        }
        tags.push(def.tag);
        fully_required &= def.required;
        current = &def.nested;
    }

    let leaf = find_field(model_name, current, last, path)?;
    if leaf.field_type == FieldType::Nested {
        return Err(DbError::invalid_argument(format!(
            "path `{path}` addresses a nested group, not a leaf field"
        )));
    }
    tags.push(leaf.tag);
    fully_required &= leaf.required;
    Ok(ResolvedPath {
        tags,
        leaf,
        fully_required,
    })
}

fn find_field<'a>(
    model_name: &str,
    fields: &'a [FieldDef],
    name: &str,
    path: &str,
) -> DbResult<&'a FieldDef> {
    fields.iter().find(|f| f.name == name).ok_or_else(|| {
        DbError::invalid_argument(format!("unknown field path `{path}` on model `{model_name}`"))
    })
}

/// Builder returned by [`Model::builder`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    fields: Vec<FieldDef>,
    indexes: Vec<IndexDef>,
}

impl ModelBuilder {
    /// Adds a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Validates the declaration and produces the model.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] when names clash or are malformed, tags
    /// collide, an index path does not resolve to an orderable leaf field,
    /// or a TTL index does not lead with a required `DateTime`.
    pub fn build(self) -> DbResult<Model> {
        let Self {
            name,
            fields,
            indexes,
        } = self;
        check_name("model", &name)?;
        if fields.is_empty() {
            return Err(DbError::schema(format!("model `{name}` declares no fields")));
        }
        check_fields(&name, &fields)?;

        let mut built: Vec<IndexDef> = Vec::with_capacity(indexes.len());
        for mut index in indexes {
            check_name("index", &index.name)?;
            if built.iter().any(|done| done.name == index.name) {
                return Err(DbError::schema(format!(
                    "model `{name}` declares index `{}` twice",
                    index.name
                )));
            }
            if index.fields.is_empty() {
                return Err(DbError::schema(format!(
                    "index `{}` projects no fields",
                    index.name
                )));
            }
            for field in &index.fields {
                let resolved = resolve_in(&name, &fields, &field.path).map_err(|_| {
                    DbError::schema(format!(
                        "index `{}` references `{}`, which is not an indexable leaf field \
                         of model `{name}`",
                        index.name, field.path
                    ))
                })?;
                if !resolved.leaf.field_type.is_orderable() {
                    return Err(DbError::schema(format!(
                        "index `{}` references `{}`, which has unorderable type {}",
                        index.name,
                        field.path,
                        resolved.leaf.field_type.name()
                    )));
                }
            }
            if index.ttl {
                // fields[0] exists, checked above
                let leading = &index.fields[0];
                let resolved = resolve_in(&name, &fields, &leading.path)?;
                if resolved.leaf.field_type != FieldType::DateTime {
                    return Err(DbError::schema(format!(
                        "TTL index `{}` must lead with a DateTime field, `{}` is {}",
                        index.name,
                        leading.path,
                        resolved.leaf.field_type.name()
                    )));
                }
                if !resolved.fully_required {
                    return Err(DbError::schema(format!(
                        "TTL index `{}` must lead with a required field, `{}` is optional",
                        index.name, leading.path
                    )));
                }
            }
            index.tag = crc32fast::hash(format!("{name}:{}", index.name).as_bytes());
            if built.iter().any(|done| done.tag == index.tag) {
                return Err(DbError::schema(format!(
                    "index `{}` collides with another index tag on model `{name}`",
                    index.name
                )));
            }
            built.push(index);
        }

        Ok(Model {
            name,
            fields,
            indexes: built,
        })
    }
}

fn check_name(kind: &str, name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::schema(format!("{kind} name must not be empty")));
    }
    if name.contains(':') || name.contains('\0') {
        return Err(DbError::schema(format!(
            "{kind} name `{}` contains a reserved character",
            name.escape_default()
        )));
    }
    Ok(())
}

fn check_fields(model_name: &str, fields: &[FieldDef]) -> DbResult<()> {
    for (position, field) in fields.iter().enumerate() {
        check_name("field", &field.name)?;
        if field.name.contains('.') {
            return Err(DbError::schema(format!(
                "field name `{}` contains a path separator",
                field.name
            )));
        }
        for earlier in &fields[..position] {
            if earlier.name == field.name {
                return Err(DbError::schema(format!(
                    "model `{model_name}` declares field name `{}` twice",
                    field.name
                )));
            }
            if earlier.tag == field.tag {
                return Err(DbError::schema(format!(
                    "model `{model_name}` declares field tag {} twice",
                    field.tag
                )));
            }
        }
        match field.field_type {
            FieldType::Nested if field.nested.is_empty() => {
                return Err(DbError::schema(format!(
                    "nested group `{}` declares no child fields",
                    field.name
                )));
            }
            FieldType::Nested => check_fields(model_name, &field.nested)?,
            _ if !field.nested.is_empty() => {
                return Err(DbError::schema(format!(
                    "scalar field `{}` cannot declare child fields",
                    field.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Model {
        Model::builder("widget")
            .field(FieldDef::required(1, "name", FieldType::Text))
            .field(FieldDef::optional(2, "price", FieldType::UInt32))
            .field(FieldDef::nested(
                3,
                "dims",
                [
                    FieldDef::required(1, "width", FieldType::UInt16),
                    FieldDef::required(2, "height", FieldType::UInt16),
                ],
            ))
            .index(IndexDef::on("byName", ["name"]).unique())
            .index(IndexDef::on("byPrice", [IndexField::desc("price")]))
            .index(IndexDef::on("byWidth", ["dims.width"]))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_and_names_keyspaces() {
        let model = widget();
        assert_eq!(model.primary_keyspace(), "m:widget");
        let by_name = model.index("byName").unwrap();
        assert_eq!(model.index_keyspace(by_name), "i:widget:byName");
        assert_eq!(model.ttl_keyspace(), "ttl:widget");
        assert!(!model.has_ttl_indexes());
    }

    #[test]
    fn index_tags_are_deterministic_and_distinct() {
        let first = widget();
        let second = widget();
        for (a, b) in first.indexes().iter().zip(second.indexes()) {
            assert_eq!(a.tag(), b.tag());
        }
        assert_ne!(first.indexes()[0].tag(), first.indexes()[1].tag());
    }

    #[test]
    fn resolves_nested_paths() {
        let model = widget();
        let resolved = model.resolve_path("dims.height").unwrap();
        assert_eq!(resolved.tags, vec![3, 2]);
        assert_eq!(resolved.leaf.field_type(), FieldType::UInt16);
        assert!(resolved.fully_required);

        let top = model.resolve_path("price").unwrap();
        assert_eq!(top.tags, vec![2]);
        assert!(!top.fully_required);
    }

    #[test]
    fn rejects_unknown_and_group_paths() {
        let model = widget();
        assert!(matches!(
            model.resolve_path("nope"),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            model.resolve_path("dims"),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            model.resolve_path("name.sub"),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_tags_and_names() {
        let dup_tag = Model::builder("m")
            .field(FieldDef::required(1, "a", FieldType::Text))
            .field(FieldDef::required(1, "b", FieldType::Text))
            .build();
        assert!(matches!(dup_tag, Err(DbError::Schema { .. })));

        let dup_name = Model::builder("m")
            .field(FieldDef::required(1, "a", FieldType::Text))
            .field(FieldDef::required(2, "a", FieldType::Text))
            .build();
        assert!(matches!(dup_name, Err(DbError::Schema { .. })));

        let dup_index = Model::builder("m")
            .field(FieldDef::required(1, "a", FieldType::Text))
            .index(IndexDef::on("byA", ["a"]))
            .index(IndexDef::on("byA", ["a"]))
            .build();
        assert!(matches!(dup_index, Err(DbError::Schema { .. })));
    }

    #[test]
    fn rejects_bad_index_paths() {
        let unknown = Model::builder("m")
            .field(FieldDef::required(1, "a", FieldType::Text))
            .index(IndexDef::on("byB", ["b"]))
            .build();
        assert!(matches!(unknown, Err(DbError::Schema { .. })));

        let group = Model::builder("m")
            .field(FieldDef::nested(
                1,
                "g",
                [FieldDef::required(1, "x", FieldType::Int32)],
            ))
            .index(IndexDef::on("byG", ["g"]))
            .build();
        assert!(matches!(group, Err(DbError::Schema { .. })));
    }

    #[test]
    fn ttl_index_requires_required_datetime_lead() {
        let not_datetime = Model::builder("m")
            .field(FieldDef::required(1, "a", FieldType::Text))
            .index(IndexDef::on("exp", ["a"]).ttl())
            .build();
        assert!(matches!(not_datetime, Err(DbError::Schema { .. })));

        let optional = Model::builder("m")
            .field(FieldDef::optional(1, "expiresAt", FieldType::DateTime))
            .index(IndexDef::on("exp", ["expiresAt"]).ttl())
            .build();
        assert!(matches!(optional, Err(DbError::Schema { .. })));

        let ok = Model::builder("m")
            .field(FieldDef::required(1, "expiresAt", FieldType::DateTime))
            .index(IndexDef::on("exp", ["expiresAt"]).ttl())
            .build()
            .unwrap();
        assert!(ok.has_ttl_indexes());
        assert_eq!(ok.ttl_indexes().count(), 1);
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(matches!(
            Model::builder("")
                .field(FieldDef::required(1, "a", FieldType::Text))
                .build(),
            Err(DbError::Schema { .. })
        ));
        assert!(matches!(
            Model::builder("a:b")
                .field(FieldDef::required(1, "a", FieldType::Text))
                .build(),
            Err(DbError::Schema { .. })
        ));
        assert!(matches!(
            Model::builder("m")
                .field(FieldDef::required(1, "a.b", FieldType::Text))
                .build(),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn rejects_empty_nested_group() {
        let empty = Model::builder("m")
            .field(FieldDef::nested(1, "g", []))
            .build();
        assert!(matches!(empty, Err(DbError::Schema { .. })));
    }
}
