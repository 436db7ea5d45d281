use crate::db::{DocumentDb, DocumentIndex, DocumentRecord};
use crate::document::{reference_ids, Document};
use crate::error::{CatalogError, Result};
use crate::integrity;
use crate::schema::{builtin_schema, CatalogSchema, EntityKind, KindDefinition};
use crate::validation;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main entry point for the catalog.
/// Holds the document database and the parsed schema. Cloning is cheap: every
/// clone shares the same connection, so the composition root opens one store
/// and hands clones to whatever needs it.
#[derive(Clone)]
pub struct Store {
    db: Arc<DocumentDb>,
    schema: Arc<CatalogSchema>,
}

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

/// Parse `sqlite://<path>`, `sqlite:<path>`, a bare path, or `:memory:`.
pub fn parse_database_url(url: &str) -> Result<DatabaseLocation> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .trim();

    match rest {
        "" => Err(CatalogError::Other(format!("Empty database path in '{url}'"))),
        ":memory:" => Ok(DatabaseLocation::Memory),
        path => Ok(DatabaseLocation::File(PathBuf::from(path))),
    }
}

impl Store {
    /// Open the store named by a connection string, using the built-in schema.
    pub fn open(url: &str) -> Result<Self> {
        match parse_database_url(url)? {
            DatabaseLocation::Memory => Self::open_in_memory(),
            DatabaseLocation::File(path) => Self::open_path(&path),
        }
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        log::debug!("opening catalog database at {}", path.display());
        Ok(Self::with_schema(DocumentDb::open(path)?, builtin_schema()?))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_schema(DocumentDb::open_in_memory()?, builtin_schema()?))
    }

    pub fn with_schema(db: DocumentDb, schema: CatalogSchema) -> Self {
        Store {
            db: Arc::new(db),
            schema: Arc::new(schema),
        }
    }

    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    pub fn definition(&self, kind: EntityKind) -> &KindDefinition {
        self.schema.kind(kind)
    }

    pub(crate) fn db(&self) -> &DocumentDb {
        &self.db
    }

    // ── Dynamic API ─────────────────────────────────────────────────

    /// Insert a new document. Defaults are applied, the document is checked
    /// against its kind and every reference must resolve. Returns the new id.
    pub fn create(&self, kind: EntityKind, data: serde_json::Value) -> Result<String> {
        self.db
            .transaction(|idx| insert_in(idx, &self.schema, kind, data))
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Document<serde_json::Value>> {
        self.db.read(|idx| {
            load(idx, self.definition(kind), id)?.ok_or_else(|| CatalogError::not_found(kind, id))
        })
    }

    /// List documents of a kind, filtered, sorted and projected per `query`.
    pub fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Document<serde_json::Value>>> {
        let records = self
            .db
            .read(|idx| idx.list_documents(&self.definition(kind).collection))?;
        let docs = records
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>>>()?;
        Ok(query.apply(docs))
    }

    /// Replace a document in full. Returns the stored document.
    pub fn update(
        &self,
        kind: EntityKind,
        id: &str,
        data: serde_json::Value,
    ) -> Result<Document<serde_json::Value>> {
        self.db
            .transaction(|idx| replace_in(idx, &self.schema, kind, id, data))
    }

    /// Delete a document without consulting its dependents. Use
    /// [`Store::guarded_delete`] for user-facing deletes.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let deleted = self
            .db
            .read(|idx| idx.delete_document(&self.definition(kind).collection, id))?;
        if !deleted {
            return Err(CatalogError::not_found(kind, id));
        }
        Ok(())
    }

    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        self.db
            .read(|idx| idx.count_documents(&self.definition(kind).collection))
    }

    /// Number of documents of `kind` whose `field` equals `value`.
    pub fn count_where(&self, kind: EntityKind, field: &str, value: &serde_json::Value) -> Result<usize> {
        let query = ListQuery::new().filter(field, value.clone());
        Ok(self.list(kind, &query)?.len())
    }

    /// Documents of kind `referencing` that hold a reference to `target_id`
    /// in any ref/list field targeting `target`.
    pub fn find_referencing(
        &self,
        referencing: EntityKind,
        target: EntityKind,
        target_id: &str,
    ) -> Result<Vec<Document<serde_json::Value>>> {
        self.db
            .read(|idx| referencing_in(idx, &self.schema, referencing, target, target_id))
    }

    /// Copy of `doc` with every reference id replaced by the flattened
    /// referenced document. Ids that no longer resolve are dropped.
    pub fn populate(
        &self,
        kind: EntityKind,
        doc: &Document<serde_json::Value>,
    ) -> Result<Document<serde_json::Value>> {
        self.db.read(|idx| populate_in(idx, &self.schema, kind, doc))
    }

    /// Fetch a document and populate its references in one read.
    pub fn get_populated(&self, kind: EntityKind, id: &str) -> Result<Document<serde_json::Value>> {
        self.db.read(|idx| {
            let doc = load(idx, self.definition(kind), id)?
                .ok_or_else(|| CatalogError::not_found(kind, id))?;
            populate_in(idx, &self.schema, kind, &doc)
        })
    }

    /// Document counts for every kind, keyed by collection name.
    pub fn status(&self) -> Result<serde_json::Value> {
        let mut counts = serde_json::Map::new();
        for kind in EntityKind::ALL {
            counts.insert(
                self.definition(kind).collection.clone(),
                serde_json::json!(self.count(kind)?),
            );
        }
        Ok(serde_json::json!({ "collections": counts }))
    }

    // ── Typed API ───────────────────────────────────────────────────

    pub fn get_as<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> Result<Document<T>> {
        let doc = self.get(kind, id)?;
        Ok(Document {
            id: doc.id,
            data: serde_json::from_value(doc.data)?,
        })
    }

    pub fn list_as<T: DeserializeOwned>(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Document<T>>> {
        self.list(kind, query)?
            .into_iter()
            .map(|doc| {
                Ok(Document {
                    id: doc.id,
                    data: serde_json::from_value(doc.data)?,
                })
            })
            .collect()
    }

    pub fn insert_typed<T: Serialize>(&self, kind: EntityKind, data: &T) -> Result<String> {
        self.create(kind, serde_json::to_value(data)?)
    }

    pub fn update_typed<T: Serialize>(&self, kind: EntityKind, id: &str, data: &T) -> Result<()> {
        self.update(kind, id, serde_json::to_value(data)?)?;
        Ok(())
    }
}

// ── Operations over an open index ───────────────────────────────────
//
// These run inside a caller's read or transaction so that checks and writes
// made together see the same state.

pub(crate) fn new_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

fn to_document(record: &DocumentRecord) -> Result<Document<serde_json::Value>> {
    Ok(Document {
        id: record.id.clone(),
        data: record.parse_data()?,
    })
}

pub(crate) fn load(
    idx: &DocumentIndex<'_>,
    definition: &KindDefinition,
    id: &str,
) -> Result<Option<Document<serde_json::Value>>> {
    idx.get_document(&definition.collection, id)?
        .as_ref()
        .map(to_document)
        .transpose()
}

pub(crate) fn load_all(
    idx: &DocumentIndex<'_>,
    definition: &KindDefinition,
) -> Result<Vec<Document<serde_json::Value>>> {
    idx.list_documents(&definition.collection)?
        .iter()
        .map(to_document)
        .collect()
}

/// Apply defaults, check the shape and every reference, then return the
/// prepared data.
fn prepare_write(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    mut data: serde_json::Value,
) -> Result<serde_json::Value> {
    let definition = schema.kind(kind);
    validation::validate_and_prepare(definition, &mut data)?;

    let dangling = integrity::dangling_references(idx, schema, kind, &data)?;
    if !dangling.is_empty() {
        let listed: Vec<String> = dangling.iter().map(|d| d.to_string()).collect();
        return Err(CatalogError::Validation(format!(
            "{} references missing documents: {}",
            definition.title,
            listed.join(", ")
        )));
    }
    Ok(data)
}

pub(crate) fn insert_in(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    data: serde_json::Value,
) -> Result<String> {
    let data = prepare_write(idx, schema, kind, data)?;
    let id = new_id();
    idx.insert_document(&schema.kind(kind).collection, &id, &data)?;
    log::debug!("created {kind} {id}");
    Ok(id)
}

pub(crate) fn replace_in(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    id: &str,
    data: serde_json::Value,
) -> Result<Document<serde_json::Value>> {
    let collection = &schema.kind(kind).collection;
    if !idx.exists(collection, id)? {
        return Err(CatalogError::not_found(kind, id));
    }
    let data = prepare_write(idx, schema, kind, data)?;
    idx.replace_document(collection, id, &data)?;
    log::debug!("updated {kind} {id}");
    Ok(Document {
        id: id.to_string(),
        data,
    })
}

pub(crate) fn referencing_in(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    referencing: EntityKind,
    target: EntityKind,
    target_id: &str,
) -> Result<Vec<Document<serde_json::Value>>> {
    let definition = schema.kind(referencing);
    let fields: Vec<&str> = definition
        .reference_fields()
        .filter(|f| f.target == Some(target))
        .map(|f| f.name.as_str())
        .collect();
    if fields.is_empty() {
        return Ok(Vec::new());
    }

    // The LIKE prefilter also matches the id appearing in unrelated fields
    let mut found = Vec::new();
    for record in idx.find_mentions(&definition.collection, target_id)? {
        let doc = to_document(&record)?;
        let holds = fields
            .iter()
            .any(|f| reference_ids(doc.data.get(*f)).contains(&target_id));
        if holds {
            found.push(doc);
        }
    }
    Ok(found)
}

pub(crate) fn populate_in(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    doc: &Document<serde_json::Value>,
) -> Result<Document<serde_json::Value>> {
    let mut data = doc.data.clone();
    let map = match data.as_object_mut() {
        Some(m) => m,
        None => return Ok(doc.clone()),
    };

    for field in schema.kind(kind).reference_fields() {
        let Some(target) = field.target else { continue };
        let target_def = schema.kind(target);

        // Projected-out fields stay absent
        let Some(current) = map.get(&field.name) else { continue };
        let mut resolved = Vec::new();
        for id in reference_ids(Some(current)) {
            if let Some(found) = load(idx, target_def, id)? {
                resolved.push(found.to_json());
            }
        }

        let value = if field.is_multi() {
            serde_json::Value::Array(resolved)
        } else {
            resolved.into_iter().next().unwrap_or(serde_json::Value::Null)
        };
        map.insert(field.name.clone(), value);
    }

    Ok(Document {
        id: doc.id.clone(),
        data,
    })
}

// ── Listing ─────────────────────────────────────────────────────────

/// Filter, sort and projection for [`Store::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Vec<(String, serde_json::Value)>,
    pub sort: Option<String>,
    pub fields: Option<Vec<String>>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The list page query for a kind: its sort field and list projection.
    pub fn for_listing(definition: &KindDefinition) -> Self {
        let mut query = ListQuery {
            sort: definition.sort.clone(),
            ..Default::default()
        };
        if !definition.list_fields.is_empty() {
            query.fields = Some(definition.list_fields.clone());
        }
        query
    }

    /// Keep only documents whose `field` equals `value`.
    pub fn filter(mut self, field: &str, value: serde_json::Value) -> Self {
        self.filter.push((field.to_string(), value));
        self
    }

    /// Ascending sort by `field`. Ties keep id order.
    pub fn sort_by(mut self, field: &str) -> Self {
        self.sort = Some(field.to_string());
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    fn apply(&self, docs: Vec<Document<serde_json::Value>>) -> Vec<Document<serde_json::Value>> {
        let mut docs: Vec<_> = docs
            .into_iter()
            .filter(|doc| {
                self.filter
                    .iter()
                    .all(|(field, value)| doc.data.get(field) == Some(value))
            })
            .collect();

        if let Some(sort) = &self.sort {
            docs.sort_by(|a, b| compare_values(a.data.get(sort), b.data.get(sort)));
        }

        if let Some(fields) = &self.fields {
            for doc in &mut docs {
                if let Some(map) = doc.data.as_object_mut() {
                    map.retain(|k, _| fields.iter().any(|f| f == k));
                }
            }
        }

        docs
    }
}

/// Ascending order for sort keys: missing and null first, then numbers, then
/// strings.
fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    use serde_json::Value;

    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
