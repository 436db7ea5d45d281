use crate::db::DocumentIndex;
use crate::error::{CatalogError, Result};
use crate::integrity;
use crate::schema::{CatalogSchema, EntityKind};
use crate::store::{self, Store};
use crate::validation::{self, Draft, FieldError, FormInput};

/// What a form submission asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Create,
    Update(String),
}

/// Result of a form submission.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The document was written under `id`.
    Saved { id: String },
    /// A document with the same unique value already exists. Nothing was written.
    Existing { id: String },
    /// The submission was rejected. Nothing was written.
    Invalid(Draft),
}

impl WriteOutcome {
    /// Id of the document to redirect to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            WriteOutcome::Saved { id } | WriteOutcome::Existing { id } => Some(id),
            WriteOutcome::Invalid(_) => None,
        }
    }
}

impl Store {
    /// Normalise a form submission and persist it if it is valid.
    ///
    /// An invalid submission never touches storage, so resubmitting the same
    /// input yields the same draft. Reference checks, the unique-value lookup
    /// and the write share one transaction.
    pub fn submit(
        &self,
        kind: EntityKind,
        submission: &Submission,
        input: &FormInput,
    ) -> Result<WriteOutcome> {
        let draft = validation::normalize(self.definition(kind), input);
        if !draft.is_valid() {
            log::debug!("{kind} submission rejected with {} error(s)", draft.errors.len());
            return Ok(WriteOutcome::Invalid(draft));
        }

        self.db()
            .transaction(|idx| persist(idx, self.schema(), kind, submission, draft))
    }
}

fn persist(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    submission: &Submission,
    mut draft: Draft,
) -> Result<WriteOutcome> {
    let data = draft.to_value();

    if let Submission::Update(id) = submission {
        if !idx.exists(&schema.kind(kind).collection, id)? {
            return Err(CatalogError::not_found(kind, id));
        }
    }

    let dangling = integrity::dangling_references(idx, schema, kind, &data)?;
    if !dangling.is_empty() {
        for d in dangling {
            if draft.errors.iter().any(|e| e.field == d.field) {
                continue;
            }
            draft.errors.push(FieldError {
                message: format!("Unknown {} '{}'", schema.kind(d.target).title, d.id),
                value: Some(d.id),
                field: d.field,
            });
        }
        return Ok(WriteOutcome::Invalid(draft));
    }

    match submission {
        Submission::Create => {
            if let Some(id) = find_by_unique(idx, schema, kind, &data)? {
                log::debug!("{kind} already exists as {id}; not inserting");
                return Ok(WriteOutcome::Existing { id });
            }
            let id = store::insert_in(idx, schema, kind, data)?;
            Ok(WriteOutcome::Saved { id })
        }
        Submission::Update(id) => {
            store::replace_in(idx, schema, kind, id, data)?;
            Ok(WriteOutcome::Saved { id: id.clone() })
        }
    }
}

/// Id of the document sharing `data`'s unique field value, if the kind has one.
fn find_by_unique(
    idx: &DocumentIndex<'_>,
    schema: &CatalogSchema,
    kind: EntityKind,
    data: &serde_json::Value,
) -> Result<Option<String>> {
    let definition = schema.kind(kind);
    let Some(field) = &definition.unique else {
        return Ok(None);
    };
    let Some(wanted) = data.get(field) else {
        return Ok(None);
    };

    let existing = store::load_all(idx, definition)?
        .into_iter()
        .find(|doc| doc.data.get(field) == Some(wanted))
        .map(|doc| doc.id);
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::DeleteOutcome;
    use crate::store::ListQuery;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn saved_id(outcome: WriteOutcome) -> String {
        match outcome {
            WriteOutcome::Saved { id } => id,
            other => panic!("expected saved document, got {other:?}"),
        }
    }

    fn whiplash(genre_id: &str) -> FormInput {
        FormInput::default()
            .with("name", "Whiplash")
            .with("rating", "8.5")
            .with("description", "A drummer & his teacher")
            .with("date_of_release", "2014-10-10")
            .with("genre_ids", genre_id)
    }

    #[test]
    fn test_drama_whiplash_scenario() {
        let store = Store::open_in_memory().unwrap();

        let drama = saved_id(
            store
                .submit(
                    EntityKind::Genre,
                    &Submission::Create,
                    &FormInput::default().with("name", "Drama"),
                )
                .unwrap(),
        );
        let movie = saved_id(
            store
                .submit(EntityKind::Movie, &Submission::Create, &whiplash(&drama))
                .unwrap(),
        );

        let detail = store.get_populated(EntityKind::Movie, &movie).unwrap();
        let genres: Vec<&str> = detail.data["genre_ids"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|g| g["name"].as_str())
            .collect();
        assert_eq!(genres, vec!["Drama"]);

        match store.guarded_delete(EntityKind::Genre, &drama).unwrap() {
            DeleteOutcome::Blocked(deps) => {
                assert_eq!(deps.len(), 1);
                assert_eq!(deps[0].document.field_str("name"), Some("Whiplash"));
            }
            other => panic!("expected blocked delete, got {other:?}"),
        }

        assert_eq!(
            store.guarded_delete(EntityKind::Movie, &movie).unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            store.guarded_delete(EntityKind::Genre, &drama).unwrap(),
            DeleteOutcome::Deleted
        );
    }

    #[test]
    fn test_duplicate_genre_redirects_to_existing() {
        let store = Store::open_in_memory().unwrap();
        let input = FormInput::default().with("name", "Drama");

        let first = saved_id(store.submit(EntityKind::Genre, &Submission::Create, &input).unwrap());
        let again = store
            .submit(
                EntityKind::Genre,
                &Submission::Create,
                &FormInput::default().with("name", "  Drama "),
            )
            .unwrap();

        assert_eq!(again, WriteOutcome::Existing { id: first });
        assert_eq!(store.count(EntityKind::Genre).unwrap(), 1);
    }

    #[test]
    fn test_invalid_submission_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let input = FormInput::default()
            .with("name", "")
            .with("rating", "8")
            .with("date_of_release", "2014-10-10");

        let first = store.submit(EntityKind::Movie, &Submission::Create, &input).unwrap();
        let second = store.submit(EntityKind::Movie, &Submission::Create, &input).unwrap();

        match &first {
            WriteOutcome::Invalid(draft) => {
                assert_eq!(draft.errors.len(), 1);
                assert_eq!(draft.errors[0].field, "name");
                assert_eq!(draft.data["rating"], json!(8.0));
            }
            other => panic!("expected invalid draft, got {other:?}"),
        }
        assert_eq!(first, second);
        assert_eq!(store.count(EntityKind::Movie).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_keeps_every_attribute() {
        let store = Store::open_in_memory().unwrap();
        let input = FormInput::default()
            .with("full_name", "Mica Levi")
            .with("bio", "Composer")
            .with("date_of_birth", "1987-01-01")
            .with("image_ref", "https://img.example/mica.png");

        let id = saved_id(store.submit(EntityKind::Writer, &Submission::Create, &input).unwrap());
        let doc = store.get(EntityKind::Writer, &id).unwrap();
        assert_eq!(
            doc.data,
            json!({
                "full_name": "Mica Levi",
                "bio": "Composer",
                "date_of_birth": "1987-01-01",
                "date_of_death": null,
                "image_ref": "https://img.example/mica.png",
            })
        );
    }

    #[test]
    fn test_update_replaces_and_unknown_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let id = saved_id(
            store
                .submit(
                    EntityKind::Genre,
                    &Submission::Create,
                    &FormInput::default().with("name", "Drama"),
                )
                .unwrap(),
        );

        let outcome = store
            .submit(
                EntityKind::Genre,
                &Submission::Update(id.clone()),
                &FormInput::default().with("name", "Melodrama"),
            )
            .unwrap();
        assert_eq!(outcome.id(), Some(id.as_str()));
        assert_eq!(store.get(EntityKind::Genre, &id).unwrap().field_str("name"), Some("Melodrama"));

        let err = store
            .submit(
                EntityKind::Genre,
                &Submission::Update("missing".into()),
                &FormInput::default().with("name", "Noir"),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_repeated_checkbox_stores_genre_once() {
        let store = Store::open_in_memory().unwrap();
        let drama = saved_id(
            store
                .submit(
                    EntityKind::Genre,
                    &Submission::Create,
                    &FormInput::default().with("name", "Drama"),
                )
                .unwrap(),
        );

        let input = whiplash(&drama).with("genre_ids", &drama);
        let movie = saved_id(store.submit(EntityKind::Movie, &Submission::Create, &input).unwrap());

        assert_eq!(
            store.get(EntityKind::Movie, &movie).unwrap().data["genre_ids"],
            json!([drama])
        );
        let detail = store.get_populated(EntityKind::Movie, &movie).unwrap();
        assert_eq!(detail.data["genre_ids"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_update_of_unknown_id_returns_draft() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store
            .submit(
                EntityKind::Genre,
                &Submission::Update("missing".into()),
                &FormInput::default().with("name", ""),
            )
            .unwrap();
        assert!(matches!(outcome, WriteOutcome::Invalid(_)));
    }

    #[test]
    fn test_unknown_reference_becomes_field_error() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store
            .submit(EntityKind::Movie, &Submission::Create, &whiplash("no-such-genre"))
            .unwrap();

        match outcome {
            WriteOutcome::Invalid(draft) => {
                assert_eq!(draft.errors.len(), 1);
                assert_eq!(draft.errors[0].field, "genre_ids");
                assert_eq!(draft.errors[0].message, "Unknown Genre 'no-such-genre'");
                assert_eq!(draft.data["genre_ids"], json!(["no-such-genre"]));
            }
            other => panic!("expected invalid draft, got {other:?}"),
        }
        assert!(store.list(EntityKind::Movie, &ListQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_movie_instance_defaults_status() {
        let store = Store::open_in_memory().unwrap();
        let movie = saved_id(
            store
                .submit(
                    EntityKind::Movie,
                    &Submission::Create,
                    &FormInput::default()
                        .with("name", "Arrival")
                        .with("rating", "7.9")
                        .with("date_of_release", "2016-11-11"),
                )
                .unwrap(),
        );

        let inst = saved_id(
            store
                .submit(
                    EntityKind::MovieInstance,
                    &Submission::Create,
                    &FormInput::default().with("movie_id", &movie),
                )
                .unwrap(),
        );
        let doc = store.get(EntityKind::MovieInstance, &inst).unwrap();
        assert_eq!(doc.data, json!({ "movie_id": movie, "status": "ComingSoon" }));
    }
}
