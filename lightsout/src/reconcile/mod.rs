// Pre-selected choice lists for entity forms

use crate::document::{reference_ids, Document};
use crate::error::Result;
use crate::schema::EntityKind;
use crate::store::{ListQuery, Store};
use serde::Serialize;
use std::collections::BTreeMap;

/// One entry of a form's choice list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

/// Annotate every candidate with whether `current` references it. `current`
/// is a ref or list field value holding raw ids, populated sub-documents, or
/// a mix of both.
pub fn mark_selected(
    candidates: &[Document<serde_json::Value>],
    label_field: &str,
    current: Option<&serde_json::Value>,
) -> Vec<Candidate> {
    let chosen = reference_ids(current);
    candidates
        .iter()
        .map(|doc| Candidate {
            id: doc.id.clone(),
            label: doc.field_str(label_field).unwrap_or_default().to_string(),
            selected: chosen.contains(&doc.id.as_str()),
        })
        .collect()
}

impl Store {
    /// Choice lists for every ref/list field of `kind`, keyed by field name.
    /// `current` is the document being edited, or a rejected draft; `None`
    /// leaves every candidate unselected.
    pub fn form_choices(
        &self,
        kind: EntityKind,
        current: Option<&serde_json::Value>,
    ) -> Result<BTreeMap<String, Vec<Candidate>>> {
        let mut choices = BTreeMap::new();

        for field in self.definition(kind).reference_fields() {
            let Some(target) = field.target else { continue };
            let target_def = self.definition(target);

            let query = match &target_def.sort {
                Some(sort) => ListQuery::new().sort_by(sort),
                None => ListQuery::new(),
            };
            let candidates = self.list(target, &query)?;
            let value = current.and_then(|c| c.get(&field.name));

            choices.insert(
                field.name.clone(),
                mark_selected(&candidates, &target_def.label, value),
            );
        }

        Ok(choices)
    }
}
