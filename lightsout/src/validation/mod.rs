use crate::error::{CatalogError, Result};
use crate::schema::{FieldDefinition, FieldType, KindDefinition, Step};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Raw form submission: every field name maps to the values submitted under it,
/// in submission order. Checkbox groups submit one pair per checked box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormInput {
    values: BTreeMap<String, Vec<String>>,
}

impl FormInput {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut input = FormInput::default();
        for (k, v) in pairs {
            input.values.entry(k.into()).or_default().push(v.into());
        }
        input
    }

    /// Add one submitted value for `name`.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values for `name`: none when absent, one for a scalar submission.
    pub fn all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub value: Option<String>,
}

/// A normalised form submission together with the errors found while
/// normalising it. With errors present the draft is echoed back to the form
/// instead of being stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub data: serde_json::Map<String, serde_json::Value>,
    pub errors: Vec<FieldError>,
}

impl Draft {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone())
    }
}

/// Run every field's steps over the submission. Errors accumulate across
/// fields in declaration order; each field reports at most one.
pub fn normalize(definition: &KindDefinition, input: &FormInput) -> Draft {
    let mut draft = Draft {
        data: serde_json::Map::new(),
        errors: Vec::new(),
    };

    for field in &definition.fields {
        let raw = input.first(&field.name);
        let outcome = if field.is_multi() {
            normalize_list(field, input.all(&field.name))
        } else {
            normalize_scalar(field, raw)
        };

        let (value, error) = match outcome {
            Ok(v) => (v, None),
            Err((partial, message)) => (partial, Some(message)),
        };

        draft.data.insert(field.name.clone(), value);
        if let Some(message) = error {
            draft.errors.push(FieldError {
                field: field.name.clone(),
                message,
                value: raw.map(str::to_string),
            });
        }
    }

    draft
}

type StepOutcome = std::result::Result<serde_json::Value, (serde_json::Value, String)>;

fn normalize_scalar(field: &FieldDefinition, raw: Option<&str>) -> StepOutcome {
    let mut value = match raw {
        Some(s) => serde_json::Value::String(s.to_string()),
        None => serde_json::Value::Null,
    };

    for step in &field.steps {
        match apply_step(field, *step, value)? {
            Flow::Continue(v) => value = v,
            Flow::Stop(v) => {
                value = v;
                break;
            }
        }
    }

    if value.is_null() {
        if let Some(default) = &field.default {
            value = serde_json::Value::String(default.clone());
        }
    }

    if let Some(message) = check_constraints(field, &value) {
        return Err((value, message));
    }
    Ok(value)
}

fn normalize_list(field: &FieldDefinition, raw: &[String]) -> StepOutcome {
    let mut items = Vec::with_capacity(raw.len());
    let mut failure = None;

    for item in raw {
        let mut value = serde_json::Value::String(item.clone());
        for step in &field.steps {
            match apply_step(field, *step, value) {
                Ok(Flow::Continue(v)) => value = v,
                Ok(Flow::Stop(v)) => {
                    value = v;
                    break;
                }
                Err((partial, message)) => {
                    value = partial;
                    failure.get_or_insert(message);
                    break;
                }
            }
        }
        // Reference lists are sets; the first occurrence keeps its position.
        if !value.is_null() && !items.contains(&value) {
            items.push(value);
        }
    }

    let value = serde_json::Value::Array(items);
    match failure {
        Some(message) => Err((value, message)),
        None => Ok(value),
    }
}

enum Flow {
    Continue(serde_json::Value),
    Stop(serde_json::Value),
}

fn apply_step(
    field: &FieldDefinition,
    step: Step,
    value: serde_json::Value,
) -> std::result::Result<Flow, (serde_json::Value, String)> {
    use serde_json::Value;

    let next = match (step, value) {
        (Step::Trim, Value::String(s)) => Value::String(s.trim().to_string()),
        (Step::Escape, Value::String(s)) => Value::String(escape(&s)),
        (Step::RequireNonEmpty, value) => {
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Null => 0,
                _ => usize::MAX,
            };
            if len < field.min_length.unwrap_or(1) {
                return Err((value, field_message(field, "must not be empty")));
            }
            value
        }
        (Step::OptionalNullable, value) => {
            let absent = match &value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                _ => false,
            };
            if absent {
                return Ok(Flow::Stop(Value::Null));
            }
            value
        }
        (Step::Iso8601Date, Value::String(s)) => match parse_iso8601_date(&s) {
            Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            None => {
                return Err((
                    Value::String(s),
                    field_message(field, "must be an ISO 8601 date"),
                ))
            }
        },
        (Step::Number, Value::String(s)) => match s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Some(n) => Value::Number(n),
            None => {
                return Err((
                    Value::String(s),
                    format!("'{}' must be a number", field.name),
                ))
            }
        },
        (_, value) => value,
    };

    Ok(Flow::Continue(next))
}

/// Enum membership and length limits, checked once all steps have run.
fn check_constraints(field: &FieldDefinition, value: &serde_json::Value) -> Option<String> {
    let s = value.as_str()?;
    if let Some(allowed) = &field.enum_values {
        if !allowed.iter().any(|a| a == s) {
            return Some(format!(
                "'{}' must be one of: {}",
                field.name,
                allowed.join(", ")
            ));
        }
    }
    if let Some(max) = field.max_length {
        if s.chars().count() > max {
            return Some(format!(
                "'{}' must be at most {max} characters",
                field.name
            ));
        }
    }
    None
}

fn field_message(field: &FieldDefinition, fallback: &str) -> String {
    field
        .message
        .clone()
        .unwrap_or_else(|| format!("'{}' {fallback}", field.name))
}

/// Neutralise markup so a stored value renders as text.
pub fn escape(raw: &str) -> String {
    html_escape::encode_safe(raw).into_owned()
}

/// Accepts `YYYY-MM-DD`, a naive `YYYY-MM-DDTHH:MM:SS` timestamp or RFC 3339.
pub fn parse_iso8601_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

// ── Store-level document checks ─────────────────────────────────────

/// Result of checking a document against its kind definition
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a document's shape against its kind definition: required fields,
/// value types, enum membership, length limits and unknown fields.
pub fn validate_document(definition: &KindDefinition, data: &serde_json::Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let map = match data.as_object() {
        Some(m) => m,
        None => {
            result.errors.push("Document data must be a JSON object".into());
            return result;
        }
    };

    for field in &definition.fields {
        let value = map.get(&field.name).filter(|v| !v.is_null());
        match value {
            None if field.required => {
                result
                    .errors
                    .push(format!("Required field '{}' is missing", field.name));
            }
            None => {}
            Some(v) => validate_field_value(field, v, &mut result),
        }
    }

    for key in map.keys() {
        if definition.field(key).is_none() {
            result.errors.push(format!("Unexpected field '{key}'"));
        }
    }

    result
}

fn validate_field_value(
    field: &FieldDefinition,
    value: &serde_json::Value,
    result: &mut ValidationResult,
) {
    let name = &field.name;
    match field.field_type {
        FieldType::String => {
            if !value.is_string() {
                result
                    .errors
                    .push(format!("Field '{name}' expected string, got {}", type_name(value)));
                return;
            }
            if let Some(message) = check_constraints(field, value) {
                result.errors.push(message);
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                result
                    .errors
                    .push(format!("Field '{name}' expected number, got {}", type_name(value)));
            }
        }
        FieldType::Date => {
            let valid = value
                .as_str()
                .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
                .unwrap_or(false);
            if !valid {
                result
                    .errors
                    .push(format!("Field '{name}' expected YYYY-MM-DD date, got {value}"));
            }
        }
        FieldType::Ref => {
            if value.as_str().map_or(true, str::is_empty) {
                result
                    .errors
                    .push(format!("Field '{name}' (ref) expected string ID, got {}", type_name(value)));
            }
        }
        FieldType::List => match value.as_array() {
            Some(items) if items.iter().all(|i| i.as_str().is_some_and(|s| !s.is_empty())) => {}
            Some(_) => result
                .errors
                .push(format!("Field '{name}' must hold only string IDs")),
            None => result
                .errors
                .push(format!("Field '{name}' expected list, got {}", type_name(value))),
        },
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

/// Fill absent scalar fields with their defaults and absent lists with `[]`.
pub fn apply_defaults(definition: &KindDefinition, data: &mut serde_json::Value) {
    let map = match data.as_object_mut() {
        Some(m) => m,
        None => return,
    };

    for field in &definition.fields {
        let has_value = map.get(&field.name).map(|v| !v.is_null()).unwrap_or(false);
        if has_value {
            continue;
        }
        if let Some(default) = &field.default {
            map.insert(field.name.clone(), serde_json::Value::String(default.clone()));
        } else if field.is_multi() {
            map.insert(field.name.clone(), serde_json::Value::Array(Vec::new()));
        } else {
            map.insert(field.name.clone(), serde_json::Value::Null);
        }
    }
}

/// Drop repeated ids from list fields, keeping first-seen order.
fn dedup_lists(definition: &KindDefinition, data: &mut serde_json::Value) {
    let Some(map) = data.as_object_mut() else { return };
    for field in definition.fields.iter().filter(|f| f.field_type == FieldType::List) {
        if let Some(serde_json::Value::Array(items)) = map.get_mut(&field.name) {
            let mut seen = Vec::with_capacity(items.len());
            items.retain(|item| {
                if seen.contains(item) {
                    false
                } else {
                    seen.push(item.clone());
                    true
                }
            });
        }
    }
}

/// Apply defaults and validate. Returns an error if the document is rejected.
pub fn validate_and_prepare(definition: &KindDefinition, data: &mut serde_json::Value) -> Result<()> {
    apply_defaults(definition, data);
    dedup_lists(definition, data);
    let result = validate_document(definition, data);

    if !result.is_ok() {
        return Err(CatalogError::Validation(format!(
            "{} validation failed:\n  - {}",
            definition.title,
            result.errors.join("\n  - ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{builtin_schema, EntityKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn definition(kind: EntityKind) -> KindDefinition {
        builtin_schema().unwrap().kind(kind).clone()
    }

    fn movie_input() -> FormInput {
        FormInput::default()
            .with("name", "  Whiplash ")
            .with("rating", "8.5")
            .with("date_of_release", "2014-10-10")
    }

    #[test]
    fn test_person_fields_trimmed_and_escaped() {
        let input = FormInput::default()
            .with("full_name", "  Damien <b>Chazelle ")
            .with("bio", "Tom & Jerry")
            .with("date_of_birth", "1985-01-19")
            .with("date_of_death", "")
            .with("image_ref", "");

        let draft = normalize(&definition(EntityKind::Director), &input);
        assert!(draft.is_valid(), "{:?}", draft.errors);
        assert_eq!(
            draft.to_value(),
            json!({
                "full_name": "Damien &lt;b&gt;Chazelle",
                "bio": "Tom &amp; Jerry",
                "date_of_birth": "1985-01-19",
                "date_of_death": null,
                "image_ref": null,
            })
        );
    }

    #[test]
    fn test_errors_accumulate_across_fields() {
        let input = FormInput::default()
            .with("full_name", "   ")
            .with("date_of_birth", "not-a-date")
            .with("date_of_death", "1999-02-30");

        let draft = normalize(&definition(EntityKind::Writer), &input);
        let fields: Vec<&str> = draft.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["full_name", "date_of_birth", "date_of_death"]);
        assert_eq!(draft.errors[0].message, "Full name must be specified.");
        assert_eq!(draft.errors[1].message, "Invalid date of birth");
        // Normalised-so-far value is kept for redisplay
        assert_eq!(draft.data["full_name"], json!(""));
        assert_eq!(draft.data["date_of_birth"], json!("not-a-date"));
    }

    #[test]
    fn test_full_name_length_limit() {
        let long = "x".repeat(101);
        let input = FormInput::default().with("full_name", &long);
        let draft = normalize(&definition(EntityKind::Cast), &input);
        assert_eq!(draft.errors.len(), 1);
        assert!(draft.errors[0].message.contains("at most 100"));
    }

    #[test]
    fn test_movie_reference_lists_coerced() {
        let input = movie_input()
            .with("genre_ids", "g1")
            .with("director_ids", "d1")
            .with("director_ids", "d2");

        let draft = normalize(&definition(EntityKind::Movie), &input);
        assert!(draft.is_valid(), "{:?}", draft.errors);
        assert_eq!(draft.data["name"], json!("Whiplash"));
        assert_eq!(draft.data["rating"], json!(8.5));
        assert_eq!(draft.data["description"], json!(null));
        assert_eq!(draft.data["genre_ids"], json!(["g1"]));
        assert_eq!(draft.data["director_ids"], json!(["d1", "d2"]));
        assert_eq!(draft.data["writer_ids"], json!([]));
        assert_eq!(draft.data["cast_ids"], json!([]));
    }

    #[test]
    fn test_repeated_reference_ids_collapse() {
        let input = movie_input()
            .with("genre_ids", "g1")
            .with("genre_ids", "g2")
            .with("genre_ids", "g1");

        let draft = normalize(&definition(EntityKind::Movie), &input);
        assert!(draft.is_valid(), "{:?}", draft.errors);
        assert_eq!(draft.data["genre_ids"], json!(["g1", "g2"]));
    }

    #[test]
    fn test_validate_and_prepare_dedups_lists() {
        let def = definition(EntityKind::Movie);
        let mut data = json!({
            "name": "Whiplash",
            "rating": 8.5,
            "date_of_release": "2014-10-10",
            "cast_ids": ["c2", "c1", "c2"],
        });
        validate_and_prepare(&def, &mut data).unwrap();
        assert_eq!(data["cast_ids"], json!(["c2", "c1"]));
    }

    #[test]
    fn test_reference_elements_escaped() {
        let input = movie_input().with("cast_ids", "<script>");
        let draft = normalize(&definition(EntityKind::Movie), &input);
        assert_eq!(draft.data["cast_ids"], json!(["&lt;script&gt;"]));
    }

    #[test]
    fn test_movie_required_fields() {
        let draft = normalize(&definition(EntityKind::Movie), &FormInput::default());
        let messages: Vec<&str> = draft.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Name must not be empty.",
                "Rating must not be empty.",
                "Invalid date of release",
            ]
        );
    }

    #[test]
    fn test_rating_must_be_numeric() {
        let input = FormInput::default()
            .with("name", "Whiplash")
            .with("rating", "great")
            .with("date_of_release", "2014-10-10");
        let draft = normalize(&definition(EntityKind::Movie), &input);
        assert_eq!(draft.errors.len(), 1);
        assert_eq!(draft.errors[0].field, "rating");
        assert_eq!(draft.errors[0].value.as_deref(), Some("great"));
    }

    #[test]
    fn test_release_date_accepts_timestamps() {
        let input = FormInput::default()
            .with("name", "Whiplash")
            .with("rating", "9")
            .with("date_of_release", "2014-10-10T00:00:00Z");
        let draft = normalize(&definition(EntityKind::Movie), &input);
        assert!(draft.is_valid());
        assert_eq!(draft.data["date_of_release"], json!("2014-10-10"));
    }

    #[test]
    fn test_instance_status_default_and_enum() {
        let def = definition(EntityKind::MovieInstance);

        let draft = normalize(&def, &FormInput::default().with("movie_id", "m1"));
        assert!(draft.is_valid());
        assert_eq!(draft.data["status"], json!("ComingSoon"));

        let draft = normalize(
            &def,
            &FormInput::default().with("movie_id", "m1").with("status", "Lost"),
        );
        assert_eq!(draft.errors.len(), 1);
        assert_eq!(draft.errors[0].field, "status");

        let draft = normalize(&def, &FormInput::default().with("status", "Sold"));
        assert_eq!(draft.errors[0].message, "Movie must be specified");
    }

    #[test]
    fn test_form_input_from_pairs_groups_repeated_keys() {
        let input = FormInput::from_pairs(vec![("genre_ids", "a"), ("name", "x"), ("genre_ids", "b")]);
        assert_eq!(input.all("genre_ids"), ["a".to_string(), "b".to_string()]);
        assert_eq!(input.first("name"), Some("x"));
        assert!(input.all("cast_ids").is_empty());
    }

    #[test]
    fn test_validate_document_rejects_bad_shapes() {
        let def = definition(EntityKind::Movie);
        let data = json!({
            "name": 12,
            "rating": "high",
            "date_of_release": "10/10/2014",
            "genre_ids": "g1",
            "runtime": 107,
        });
        let result = validate_document(&def, &data);
        assert_eq!(result.errors.len(), 5, "{:?}", result.errors);
        assert!(result.errors.iter().any(|e| e.contains("runtime")));
    }

    #[test]
    fn test_validate_and_prepare_applies_defaults() {
        let def = definition(EntityKind::MovieInstance);
        let mut data = json!({ "movie_id": "m1" });
        validate_and_prepare(&def, &mut data).unwrap();
        assert_eq!(data, json!({ "movie_id": "m1", "status": "ComingSoon" }));

        let mut missing = json!({ "status": "Sold" });
        let err = validate_and_prepare(&def, &mut missing).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert!(err.to_string().contains("movie_id"));
    }
}
