use super::types::{CatalogSchema, EntityKind, FieldType};
use crate::error::{CatalogError, Result};

const BUILTIN_SCHEMA: &str = include_str!("catalog.yaml");

/// Parse the schema compiled into the crate.
pub fn builtin_schema() -> Result<CatalogSchema> {
    parse_schema_str(BUILTIN_SCHEMA)
}

/// Parse a catalog schema YAML string and check it is internally consistent.
pub fn parse_schema_str(content: &str) -> Result<CatalogSchema> {
    let schema: CatalogSchema = serde_yaml::from_str(content)?;
    check_schema(&schema)?;
    Ok(schema)
}

fn check_schema(schema: &CatalogSchema) -> Result<()> {
    for kind in EntityKind::ALL {
        if !schema.kinds.contains_key(&kind) {
            return Err(CatalogError::Schema(format!("kind '{kind}' is not defined")));
        }
    }

    for (kind, def) in &schema.kinds {
        let mut named: Vec<&str> = vec![def.label.as_str()];
        named.extend(def.sort.as_deref());
        named.extend(def.unique.as_deref());
        named.extend(def.list_fields.iter().map(String::as_str));
        for name in named {
            if def.field(name).is_none() {
                return Err(CatalogError::Schema(format!(
                    "kind '{kind}' names unknown field '{name}'"
                )));
            }
        }

        for field in &def.fields {
            let is_reference = matches!(field.field_type, FieldType::Ref | FieldType::List);
            if is_reference != field.target.is_some() {
                return Err(CatalogError::Schema(format!(
                    "field '{kind}.{}' must declare a target exactly when it is a ref or list",
                    field.name
                )));
            }
        }
    }

    Ok(())
}
