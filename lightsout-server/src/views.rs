// Page payloads handed to the view layer

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use lightsout::document::{document_url, reference_id};
use lightsout::models::Person;
use lightsout::{CatalogSchema, Dependent, Document, EntityKind};
use serde::Serialize;

/// A rendered page: the view to use, its title and the view data.
pub struct Page {
    view: String,
    title: String,
    data: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    pub fn new(view: impl Into<String>, title: impl Into<String>) -> Self {
        Page {
            view: view.into(),
            title: title.into(),
            data: serde_json::Map::new(),
        }
    }

    /// View named after a kind, e.g. `movie_form`.
    pub fn for_kind(kind: EntityKind, suffix: &str, title: impl Into<String>) -> Self {
        Self::new(format!("{}_{suffix}", kind.slug()), title)
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            log::error!("page '{}': could not serialize '{key}': {e}", self.view);
            serde_json::Value::Null
        });
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("view".into(), self.view.clone().into());
        obj.insert("title".into(), self.title.clone().into());
        for (k, v) in &self.data {
            obj.insert(k.clone(), v.clone());
        }
        serde_json::Value::Object(obj)
    }

    pub fn render(self) -> HttpResponse {
        self.render_with(StatusCode::OK)
    }

    pub fn render_with(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self.to_json())
    }
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Flattened document with its `url`, `lifespan` for people, and a `url` on
/// every populated reference.
pub fn present(
    schema: &CatalogSchema,
    base: &str,
    kind: EntityKind,
    doc: &Document<serde_json::Value>,
) -> serde_json::Value {
    let mut value = doc.to_json();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("url".into(), doc.url(base, kind).into());

        if kind.is_person() {
            if let Ok(person) = serde_json::from_value::<Person>(doc.data.clone()) {
                obj.insert("lifespan".into(), person.lifespan().into());
            }
        }

        for field in schema.kind(kind).reference_fields() {
            let Some(target) = field.target else { continue };
            match obj.get_mut(&field.name) {
                Some(serde_json::Value::Array(items)) => {
                    for item in items {
                        link(base, target, item);
                    }
                }
                Some(item) => link(base, target, item),
                None => {}
            }
        }
    }

    value
}

fn link(base: &str, target: EntityKind, item: &mut serde_json::Value) {
    let url = match reference_id(item) {
        Some(id) if item.is_object() => document_url(base, target, id),
        _ => return,
    };
    if let Some(obj) = item.as_object_mut() {
        obj.insert("url".into(), url.into());
    }
}

pub fn present_all(
    schema: &CatalogSchema,
    base: &str,
    kind: EntityKind,
    docs: &[Document<serde_json::Value>],
) -> Vec<serde_json::Value> {
    docs.iter().map(|d| present(schema, base, kind, d)).collect()
}

pub fn present_dependents(
    schema: &CatalogSchema,
    base: &str,
    dependents: &[Dependent],
) -> Vec<serde_json::Value> {
    dependents
        .iter()
        .map(|d| {
            let mut value = present(schema, base, d.kind, &d.document);
            if let Some(obj) = value.as_object_mut() {
                obj.insert("kind".into(), d.kind.slug().into());
            }
            value
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightsout::schema::builtin_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_page_flattens_data_next_to_view() {
        let page = Page::for_kind(EntityKind::Genre, "list", "Genre List").with("items", vec![1, 2]);
        assert_eq!(
            page.to_json(),
            json!({ "view": "genre_list", "title": "Genre List", "items": [1, 2] })
        );
    }

    #[test]
    fn test_unserializable_value_becomes_null() {
        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1u8], 1);
        let page = Page::new("index", "Lights Out").with("counts", bad);
        assert_eq!(page.to_json()["counts"], serde_json::Value::Null);
    }

    #[test]
    fn test_present_person_adds_url_and_lifespan() {
        let schema = builtin_schema().unwrap();
        let doc = Document {
            id: "d1".to_string(),
            data: json!({
                "full_name": "Stanley Kubrick",
                "date_of_birth": "1928-07-26",
                "date_of_death": "1999-03-07",
            }),
        };
        let value = present(&schema, "/store", EntityKind::Director, &doc);
        assert_eq!(value["url"], json!("/store/director/d1"));
        assert_eq!(value["lifespan"], json!("Jul 26, 1928 - Mar 7, 1999"));
    }

    #[test]
    fn test_present_links_populated_references() {
        let schema = builtin_schema().unwrap();
        let doc = Document {
            id: "m1".to_string(),
            data: json!({
                "name": "Whiplash",
                "genre_ids": [{ "id": "g1", "name": "Drama" }],
                "cast_ids": ["c1"],
            }),
        };
        let value = present(&schema, "/store", EntityKind::Movie, &doc);
        assert_eq!(value["genre_ids"][0]["url"], json!("/store/genre/g1"));
        assert_eq!(value["cast_ids"], json!(["c1"]));
    }
}
