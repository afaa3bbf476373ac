use crate::domain::compiler::{FieldSpec, RawInput};
use crate::domain::models::{FormDefinition, FormField, FormSubmission};
use crate::error::CrmError;
use crate::services::forms::{self, DefinitionInput, FieldInput, FieldPatch};
use crate::services::submissions::{self, SubmissionFilters, SubmissionResults};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct FormDetail {
    pub form: FormDefinition,
    pub fields: Vec<FormField>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_forms).post(create_form))
        .route("/:id", get(get_form).delete(delete_form))
        .route("/:id/schema", get(form_schema))
        .route("/:id/fields", get(list_fields).post(add_field))
        .route(
            "/:id/fields/:field_id",
            patch(edit_field).delete(delete_field),
        )
        .route("/:id/reorder", post(reorder_fields))
        .route(
            "/:id/submissions",
            get(list_submissions).post(submit_form),
        )
        .with_state(state)
}

async fn list_forms(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<FormDefinition>>, CrmError> {
    Ok(Json(forms::list_definitions(state.store.as_ref(), &viewer).await?))
}

async fn create_form(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Json(input): Json<DefinitionInput>,
) -> Result<(StatusCode, Json<FormDefinition>), CrmError> {
    let form = forms::create_definition(state.store.as_ref(), &viewer, input).await?;
    Ok((StatusCode::CREATED, Json(form)))
}

async fn get_form(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<FormDetail>, CrmError> {
    let store = state.store.as_ref();
    let form = forms::get_definition(store, &viewer, id).await?;
    let fields = forms::list_fields(store, &viewer, id).await?;
    Ok(Json(FormDetail { form, fields }))
}

async fn delete_form(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, CrmError> {
    forms::delete_definition(state.store.as_ref(), &viewer, id).await?;
    Ok(Json(json!({"ok": true})))
}

async fn form_schema(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FieldSpec>>, CrmError> {
    let (_, compiled) = forms::compiled_form(state.store.as_ref(), &viewer, id).await?;
    Ok(Json(compiled.fields().to_vec()))
}

async fn list_fields(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FormField>>, CrmError> {
    Ok(Json(forms::list_fields(state.store.as_ref(), &viewer, id).await?))
}

async fn add_field(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(input): Json<FieldInput>,
) -> Result<(StatusCode, Json<FormField>), CrmError> {
    let field = forms::add_field(state.store.as_ref(), &viewer, id, input).await?;
    Ok((StatusCode::CREATED, Json(field)))
}

async fn edit_field(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((id, field_id)): Path<(i64, i64)>,
    Json(patch): Json<FieldPatch>,
) -> Result<Json<FormField>, CrmError> {
    let field = forms::edit_field(state.store.as_ref(), &viewer, id, field_id, patch).await?;
    Ok(Json(field))
}

async fn delete_field(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((id, field_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, CrmError> {
    forms::delete_field(state.store.as_ref(), &viewer, id, field_id).await?;
    Ok(Json(json!({"ok": true})))
}

/// Malformed payloads answer 400 with a single message rather than the
/// per-field 422 body.
async fn reorder_fields(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, CrmError> {
    forms::reorder(state.store.as_ref(), &viewer, id, &payload)
        .await
        .map_err(|err| match err {
            CrmError::Validation(failure) => CrmError::BadRequest(failure.summary()),
            other => other,
        })?;
    Ok(Json(json!({"ok": true})))
}

async fn submit_form(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(raw): Json<RawInput>,
) -> Result<(StatusCode, Json<FormSubmission>), CrmError> {
    let submission = submissions::submit(state.store.as_ref(), &viewer, id, &raw).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn list_submissions(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(filters): Query<SubmissionFilters>,
) -> Result<Json<SubmissionResults>, CrmError> {
    let results =
        submissions::list(state.store.as_ref(), &state.zone, &viewer, id, &filters).await?;
    Ok(Json(results))
}
