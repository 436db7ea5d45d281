// Stored documents and their flattened JSON form

use crate::schema::EntityKind;
use serde::{Deserialize, Serialize};

/// A loaded document: its id plus the typed field data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    pub id: String,
    pub data: T,
}

impl<T> Document<T> {
    /// Canonical detail URL of the document, e.g. `/store/movie/01h..`.
    pub fn url(&self, base: &str, kind: EntityKind) -> String {
        document_url(base, kind, &self.id)
    }
}

impl Document<serde_json::Value> {
    /// Flatten to a single JSON object with `id` next to the data fields.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), serde_json::Value::String(self.id.clone()));
        if let serde_json::Value::Object(fields) = &self.data {
            for (k, v) in fields {
                obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::Value::Object(obj)
    }

    /// String value of a data field, if present.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(|v| v.as_str())
    }
}

pub fn document_url(base: &str, kind: EntityKind, id: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), kind.slug(), id)
}

/// Canonical id of a stored reference: either a raw id string or a
/// populated sub-document carrying an `id` field.
pub fn reference_id(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(m) => m.get("id").and_then(|v| v.as_str()),
        _ => None,
    }
}

/// All reference ids held by a ref or list field value.
pub fn reference_ids(value: Option<&serde_json::Value>) -> Vec<&str> {
    match value {
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(reference_id).collect(),
        Some(other) => reference_id(other).into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json_flattens_id_and_fields() {
        let doc = Document {
            id: "01abc".to_string(),
            data: json!({ "name": "Drama" }),
        };
        assert_eq!(doc.to_json(), json!({ "id": "01abc", "name": "Drama" }));
        assert_eq!(doc.url("/store/", EntityKind::Genre), "/store/genre/01abc");
    }

    #[test]
    fn test_reference_ids_accepts_raw_and_populated() {
        let value = json!(["a", { "id": "b", "name": "Drama" }, 7]);
        assert_eq!(reference_ids(Some(&value)), vec!["a", "b"]);
        assert_eq!(reference_ids(Some(&json!("m1"))), vec!["m1"]);
        assert!(reference_ids(Some(&serde_json::Value::Null)).is_empty());
        assert!(reference_ids(None).is_empty());
    }
}
