//! Referential integrity across the catalog.
//!
//! Which kinds depend on which is read off the schema: kind D depends on K when
//! one of D's ref/list fields targets K. A document may only be deleted while
//! no dependent document references it, and every reference written must
//! resolve to an existing document.

use crate::db::DocumentIndex;
use crate::document::{reference_ids, Document};
use crate::error::{CatalogError, Result};
use crate::schema::{CatalogSchema, EntityKind};
use crate::store::{self, Store};
use serde::Serialize;
use std::fmt;

/// A document that holds a reference to the one being deleted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependent {
    pub kind: EntityKind,
    pub document: Document<serde_json::Value>,
}

/// Outcome of a guarded delete. A blocked delete is a normal outcome and
/// carries every referencing document.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    Blocked(Vec<Dependent>),
}

/// A reference id with no document behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    pub field: String,
    pub target: EntityKind,
    pub id: String,
}

impl fmt::Display for DanglingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} '{}'", self.field, self.target, self.id)
    }
}

impl Store {
    /// Every document referencing `kind`/`id`, across all dependent kinds.
    pub fn dependents(&self, kind: EntityKind, id: &str) -> Result<Vec<Dependent>> {
        self.db().read(|idx| dependents_in(idx, self.schema(), kind, id))
    }

    /// True when nothing references the document. NotFound if it does not exist.
    pub fn can_delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        self.db().read(|idx| {
            if !idx.exists(&self.definition(kind).collection, id)? {
                return Err(CatalogError::not_found(kind, id));
            }
            Ok(dependents_in(idx, self.schema(), kind, id)?.is_empty())
        })
    }

    /// Delete the document unless something references it. The dependent
    /// lookup and the delete share one transaction.
    pub fn guarded_delete(&self, kind: EntityKind, id: &str) -> Result<DeleteOutcome> {
        self.db().transaction(|idx| {
            let collection = &self.definition(kind).collection;
            if !idx.exists(collection, id)? {
                return Err(CatalogError::not_found(kind, id));
            }

            let blocking = dependents_in(idx, self.schema(), kind, id)?;
            if !blocking.is_empty() {
                log::info!(
                    "delete of {kind} {id} blocked by {} dependent(s)",
                    blocking.len()
                );
                return Ok(DeleteOutcome::Blocked(blocking));
            }

            idx.delete_document(collection, id)?;
            log::debug!("deleted {kind} {id}");
            Ok(DeleteOutcome::Deleted)
        })
    }
}

pub(crate) fn dependents_in(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    id: &str,
) -> Result<Vec<Dependent>> {
    let mut referencing_kinds: Vec<EntityKind> =
        schema.dependents_of(kind).into_iter().map(|(k, _)| k).collect();
    referencing_kinds.dedup();

    let mut found = Vec::new();
    for dependent in referencing_kinds {
        for document in store::referencing_in(idx, schema, dependent, kind, id)? {
            found.push(Dependent {
                kind: dependent,
                document,
            });
        }
    }
    Ok(found)
}

/// Reference ids in `data` that do not resolve to a document of their target
/// kind, in field declaration order.
pub(crate) fn dangling_references(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    data: &serde_json::Value,
) -> Result<Vec<DanglingRef>> {
    let mut dangling = Vec::new();

    for field in schema.kind(kind).reference_fields() {
        let Some(target) = field.target else { continue };
        let collection = &schema.kind(target).collection;

        for id in reference_ids(data.get(&field.name)) {
            if !idx.exists(collection, id)? {
                dangling.push(DanglingRef {
                    field: field.name.clone(),
                    target,
                    id: id.to_string(),
                });
            }
        }
    }

    Ok(dangling)
}
