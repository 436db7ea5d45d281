mod parser;
mod types;

pub use parser::{builtin_schema, parse_schema_str};
pub use types::*;

impl CatalogSchema {
    /// Definition of a kind. Every kind is present once the schema has been parsed.
    pub fn kind(&self, kind: EntityKind) -> &KindDefinition {
        &self.kinds[&kind]
    }

    /// Kinds holding references to `target`, with the field that holds them.
    pub fn dependents_of(&self, target: EntityKind) -> Vec<(EntityKind, &FieldDefinition)> {
        self.kinds
            .iter()
            .flat_map(|(kind, def)| {
                def.reference_fields()
                    .filter(move |f| f.target == Some(target))
                    .map(move |f| (*kind, f))
            })
            .collect()
    }
}

impl KindDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_reference())
    }
}

impl FieldDefinition {
    pub fn is_reference(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_multi(&self) -> bool {
        self.field_type == FieldType::List
    }
}
