use crate::db::{Store, SubmissionQuery};
use crate::domain::compiler::RawInput;
use crate::domain::models::{FormDefinition, FormSubmission, SubmissionRow, User};
use crate::domain::policy::{can_fill_forms, visibility_scope};
use crate::domain::window::DateWindow;
use crate::error::{CrmError, ValidationFailure};
use crate::services::{ensure, forms};
use crate::time_utils::LocalZone;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESULT_LIMIT: usize = 200;
/// Answers are searched in process, so a wider slice is fetched first.
pub const SEARCH_FETCH_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilters {
    pub q: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResults {
    pub form: FormDefinition,
    pub q: String,
    pub date: DateWindow,
    pub column_keys: Vec<String>,
    pub column_labels: Vec<String>,
    pub rows: Vec<SubmissionRow>,
}

pub async fn submit(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
    raw: &RawInput,
) -> Result<FormSubmission, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "fill form")?;
    let (def, compiled) = forms::compiled_form(store, viewer, form_id).await?;
    let bound = compiled
        .bind(raw)
        .map_err(|errors| CrmError::Validation(ValidationFailure::new(errors, raw.clone())))?;

    let submission = store
        .insert_submission(def.id, viewer.id, bound.into_answers())
        .await?;
    tracing::info!(
        "Submission {} stored for form {} by user {}",
        submission.id,
        def.id,
        viewer.id
    );
    Ok(submission)
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn row_matches(row: &SubmissionRow, needle: &str) -> bool {
    row.submitted_by_name.to_lowercase().contains(needle)
        || row
            .submission
            .answers
            .values()
            .any(|v| answer_text(v).to_lowercase().contains(needle))
}

/// Newest first, scoped to the viewer's own submissions unless they can view all.
pub async fn list(
    store: &dyn Store,
    zone: &LocalZone,
    viewer: &User,
    form_id: i64,
    filters: &SubmissionFilters,
) -> Result<SubmissionResults, CrmError> {
    let def = forms::get_definition(store, viewer, form_id).await?;
    let fields = store.list_fields(def.id).await?;
    let (column_keys, column_labels): (Vec<String>, Vec<String>) = fields
        .iter()
        .filter(|f| f.is_displayed)
        .map(|f| (f.key.clone(), f.label.clone()))
        .unzip();

    let needle = filters
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .unwrap_or_default();
    let window = DateWindow::parse(filters.date.as_deref());

    let query = SubmissionQuery {
        form_id: def.id,
        submitted_by: visibility_scope(viewer),
        since: window.start(zone.today()).map(|d| zone.start_of_day(d)),
        limit: if needle.is_empty() {
            RESULT_LIMIT
        } else {
            SEARCH_FETCH_LIMIT
        },
    };
    let mut rows = store.query_submissions(&query).await?;
    if !needle.is_empty() {
        rows.retain(|row| row_matches(row, &needle));
        rows.truncate(RESULT_LIMIT);
    }

    Ok(SubmissionResults {
        form: def,
        q: needle,
        date: window,
        column_keys,
        column_labels,
        rows,
    })
}
