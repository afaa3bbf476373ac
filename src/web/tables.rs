use crate::domain::compiler::RawInput;
use crate::domain::policy::{can_access_tables, can_add_records};
use crate::error::CrmError;
use crate::services::ensure;
use crate::services::tables::{self, EditableRow, InlineOutcome, RowView, TableListing, TableQuery};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct TableEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub can_add: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_tables))
        .route("/:key", get(list_rows).post(add_row))
        .route("/:key/:id", get(show_row).put(edit_row).delete(delete_row))
        .route("/:key/:id/inline", get(inline_edit).post(inline_save))
        .with_state(state)
}

async fn list_tables(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<TableEntry>>, CrmError> {
    ensure(can_access_tables(&viewer), &viewer, "list tables")?;
    let can_add = can_add_records(&viewer);
    let entries = state
        .registry
        .iter()
        .map(|table| TableEntry {
            key: table.key,
            label: table.label,
            can_add,
        })
        .collect();
    Ok(Json(entries))
}

async fn list_rows(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableListing>, CrmError> {
    let listing = tables::list(
        &state.registry,
        state.store.as_ref(),
        &state.zone,
        &viewer,
        &key,
        &query,
    )
    .await?;
    Ok(Json(listing))
}

async fn add_row(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(raw): Json<RawInput>,
) -> Result<(StatusCode, Json<RowView>), CrmError> {
    let row = tables::add(&state.registry, state.store.as_ref(), &viewer, &key, &raw).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn show_row(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((key, id)): Path<(String, i64)>,
) -> Result<Json<RowView>, CrmError> {
    let row = tables::show(&state.registry, state.store.as_ref(), &viewer, &key, id).await?;
    Ok(Json(row))
}

async fn edit_row(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((key, id)): Path<(String, i64)>,
    Json(raw): Json<RawInput>,
) -> Result<Json<RowView>, CrmError> {
    let row = tables::edit(&state.registry, state.store.as_ref(), &viewer, &key, id, &raw).await?;
    Ok(Json(row))
}

async fn delete_row(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((key, id)): Path<(String, i64)>,
) -> Result<Json<Value>, CrmError> {
    tables::delete(&state.registry, state.store.as_ref(), &viewer, &key, id).await?;
    Ok(Json(json!({"ok": true})))
}

async fn inline_edit(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((key, id)): Path<(String, i64)>,
) -> Result<Json<EditableRow>, CrmError> {
    let row = tables::inline_edit(&state.registry, state.store.as_ref(), &viewer, &key, id).await?;
    Ok(Json(row))
}

/// Both outcomes answer 200; an invalid save carries the editable row back.
async fn inline_save(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path((key, id)): Path<(String, i64)>,
    Json(raw): Json<RawInput>,
) -> Result<Json<InlineOutcome>, CrmError> {
    let outcome =
        tables::inline_save(&state.registry, state.store.as_ref(), &viewer, &key, id, &raw)
            .await?;
    Ok(Json(outcome))
}
