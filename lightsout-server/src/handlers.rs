use actix_web::{web, HttpResponse};
use futures_util::future::try_join_all;
use lightsout::document::document_url;
use lightsout::{
    DeleteOutcome, Document, EntityKind, FormInput, ListQuery, Submission, WriteOutcome,
};

use crate::error::ServerError;
use crate::views::{present, present_all, present_dependents, redirect, Page};
use crate::AppState;

type HandlerResult = Result<HttpResponse, ServerError>;
type FormPairs = web::Form<Vec<(String, String)>>;

/// Configure the catalog routes for every kind under `base_path`.
///
/// `/{kind}/create` is registered ahead of `/{kind}/{id}` so it is never read
/// as an id.
pub fn configure(cfg: &mut web::ServiceConfig, base_path: &str) {
    let mut scope = web::scope(base_path).route("/", web::get().to(index));

    for kind in EntityKind::ALL {
        let slug = kind.slug();
        let data = web::Data::new(kind);
        scope = scope
            .service(
                web::resource(format!("/{slug}/create"))
                    .app_data(data.clone())
                    .route(web::get().to(create_form))
                    .route(web::post().to(create_submit)),
            )
            .service(
                web::resource(format!("/{slug}/{{id}}/update"))
                    .app_data(data.clone())
                    .route(web::get().to(update_form))
                    .route(web::post().to(update_submit)),
            )
            .service(
                web::resource(format!("/{slug}/{{id}}/delete"))
                    .app_data(data.clone())
                    .route(web::get().to(delete_form))
                    .route(web::post().to(delete_submit)),
            )
            .service(
                web::resource(format!("/{slug}/{{id}}"))
                    .app_data(data.clone())
                    .route(web::get().to(detail)),
            )
            .service(
                web::resource(format!("/{slug}s"))
                    .app_data(data)
                    .route(web::get().to(list)),
            );
    }

    cfg.service(scope);
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> lightsout::Result<T> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| ServerError::Blocking(e.to_string()))?
        .map_err(ServerError::from)
}

fn list_url(state: &AppState, kind: EntityKind) -> String {
    format!("{}/{}s", state.base_path, kind.slug())
}

fn title_of(state: &AppState, kind: EntityKind) -> &str {
    &state.store.definition(kind).title
}

fn present_one(state: &AppState, kind: EntityKind, doc: &Document<serde_json::Value>) -> serde_json::Value {
    present(state.store.schema(), &state.base_path, kind, doc)
}

// ── Index ───────────────────────────────────────────────────────────

async fn index(state: web::Data<AppState>) -> HandlerResult {
    let counts = try_join_all(EntityKind::ALL.into_iter().map(|kind| {
        let store = state.store.clone();
        async move {
            let count = blocking(move || store.count(kind)).await?;
            Ok::<_, ServerError>((kind, count))
        }
    }));

    let store = state.store.clone();
    let available = blocking(move || {
        store.count_where(
            EntityKind::MovieInstance,
            "status",
            &serde_json::json!("Available"),
        )
    });

    let (counts, available) = tokio::try_join!(counts, available)?;

    let mut data = serde_json::Map::new();
    for (kind, count) in counts {
        data.insert(format!("{}_count", kind.slug()), count.into());
    }
    data.insert("movieinstance_available_count".into(), available.into());

    Ok(Page::new("index", "Lights Out").with("counts", data).render())
}

// ── Read pages ──────────────────────────────────────────────────────

async fn list(state: web::Data<AppState>, kind: web::Data<EntityKind>) -> HandlerResult {
    let kind = *kind.get_ref();
    let store = state.store.clone();

    let docs = blocking(move || {
        let query = ListQuery::for_listing(store.definition(kind));
        store
            .list(kind, &query)?
            .iter()
            .map(|doc| store.populate(kind, doc))
            .collect::<lightsout::Result<Vec<_>>>()
    })
    .await?;

    Ok(
        Page::for_kind(kind, "list", format!("{} List", title_of(&state, kind)))
            .with("items", present_all(state.store.schema(), &state.base_path, kind, &docs))
            .render(),
    )
}

async fn detail(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    path: web::Path<String>,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let id = path.into_inner();

    let (store, id1) = (state.store.clone(), id.clone());
    let doc = blocking(move || store.get_populated(kind, &id1));
    let (store, id2) = (state.store.clone(), id);
    let dependents = blocking(move || store.dependents(kind, &id2));
    let (doc, dependents) = tokio::try_join!(doc, dependents)?;

    let title = match kind {
        EntityKind::Movie => doc.field_str("name").unwrap_or_default().to_string(),
        _ => format!("{} Detail", title_of(&state, kind)),
    };

    Ok(Page::for_kind(kind, "detail", title)
        .with("item", present_one(&state, kind, &doc))
        .with(
            "dependents",
            present_dependents(state.store.schema(), &state.base_path, &dependents),
        )
        .render())
}

// ── Create / update ─────────────────────────────────────────────────

async fn create_form(state: web::Data<AppState>, kind: web::Data<EntityKind>) -> HandlerResult {
    let kind = *kind.get_ref();
    let store = state.store.clone();
    let choices = blocking(move || store.form_choices(kind, None)).await?;

    Ok(
        Page::for_kind(kind, "form", format!("Create {}", title_of(&state, kind)))
            .with("item", serde_json::Value::Null)
            .with("choices", choices)
            .with("errors", Vec::<lightsout::FieldError>::new())
            .render(),
    )
}

async fn create_submit(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    form: FormPairs,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let title = format!("Create {}", title_of(&state, kind));
    submit_form(&state, kind, Submission::Create, form, title).await
}

async fn update_form(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    path: web::Path<String>,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let id = path.into_inner();
    let store = state.store.clone();

    let (doc, choices) = blocking(move || {
        let doc = store.get(kind, &id)?;
        let choices = store.form_choices(kind, Some(&doc.data))?;
        Ok((doc, choices))
    })
    .await?;

    Ok(
        Page::for_kind(kind, "form", format!("Update {}", title_of(&state, kind)))
            .with("item", present_one(&state, kind, &doc))
            .with("choices", choices)
            .with("errors", Vec::<lightsout::FieldError>::new())
            .render(),
    )
}

async fn update_submit(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    path: web::Path<String>,
    form: FormPairs,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let title = format!("Update {}", title_of(&state, kind));
    submit_form(&state, kind, Submission::Update(path.into_inner()), form, title).await
}

/// Saved and already-existing documents redirect to their detail page; a
/// rejected draft re-renders the form with its errors.
async fn submit_form(
    state: &AppState,
    kind: EntityKind,
    submission: Submission,
    form: FormPairs,
    title: String,
) -> HandlerResult {
    let input = FormInput::from_pairs(form.into_inner());
    let store = state.store.clone();
    let outcome = blocking(move || store.submit(kind, &submission, &input)).await?;

    match outcome {
        WriteOutcome::Saved { id } | WriteOutcome::Existing { id } => {
            Ok(redirect(&document_url(&state.base_path, kind, &id)))
        }
        WriteOutcome::Invalid(draft) => {
            let store = state.store.clone();
            let current = draft.to_value();
            let choices = blocking(move || store.form_choices(kind, Some(&current))).await?;

            Ok(Page::for_kind(kind, "form", title)
                .with("item", draft.to_value())
                .with("choices", choices)
                .with("errors", &draft.errors)
                .render())
        }
    }
}

// ── Delete ──────────────────────────────────────────────────────────

/// Delete confirmation page. A missing document redirects to the list.
async fn delete_form(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    path: web::Path<String>,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let id = path.into_inner();

    let (store, id1) = (state.store.clone(), id.clone());
    let doc = blocking(move || store.get(kind, &id1));
    let (store, id2) = (state.store.clone(), id);
    let dependents = blocking(move || store.dependents(kind, &id2));

    match tokio::try_join!(doc, dependents) {
        Ok((doc, dependents)) => Ok(delete_page(&state, kind, &doc, &dependents)),
        Err(e) if e.is_not_found() => Ok(redirect(&list_url(&state, kind))),
        Err(e) => Err(e),
    }
}

async fn delete_submit(
    state: web::Data<AppState>,
    kind: web::Data<EntityKind>,
    path: web::Path<String>,
) -> HandlerResult {
    let kind = *kind.get_ref();
    let id = path.into_inner();
    let store = state.store.clone();

    let outcome = blocking(move || {
        let outcome = store.guarded_delete(kind, &id)?;
        match outcome {
            DeleteOutcome::Blocked(dependents) => {
                let doc = store.get(kind, &id)?;
                Ok(Some((doc, dependents)))
            }
            DeleteOutcome::Deleted => Ok(None),
        }
    })
    .await;

    match outcome {
        Ok(Some((doc, dependents))) => Ok(delete_page(&state, kind, &doc, &dependents)),
        Ok(None) => Ok(redirect(&list_url(&state, kind))),
        Err(e) if e.is_not_found() => Ok(redirect(&list_url(&state, kind))),
        Err(e) => Err(e),
    }
}

fn delete_page(
    state: &AppState,
    kind: EntityKind,
    doc: &Document<serde_json::Value>,
    dependents: &[lightsout::Dependent],
) -> HttpResponse {
    Page::for_kind(kind, "delete", format!("Delete {}", title_of(state, kind)))
        .with("item", present_one(state, kind, doc))
        .with(
            "dependents",
            present_dependents(state.store.schema(), &state.base_path, dependents),
        )
        .render()
}
