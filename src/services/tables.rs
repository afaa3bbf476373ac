//! Table registry and the generic CRUD engine over fixed-schema records.
//!
//! The registry is built once at start and shared read-only. Every engine
//! operation re-checks policy against the requesting user; nothing is cached.

use crate::db::{DateBound, DateFrom, RecordFilter, Store, StoreError, TableSchema, TextSearch};
use crate::domain::compiler::{BoundValues, CompiledForm, FieldErrors, FieldSpec, RawInput};
use crate::domain::models::{User, UserId};
use crate::domain::policy::{
    can_access_tables, can_add_records, can_manage_record, visibility_scope, Owned,
};
use crate::domain::records::{DiabetesRiskAssessment, HealthCheck, TableRecord};
use crate::domain::window::DateWindow;
use crate::error::{CrmError, ValidationFailure};
use crate::services::ensure;
use crate::time_utils::LocalZone;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;

pub const LIST_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateKind {
    /// Calendar date column, compared as-is.
    Date,
    /// Timestamp column, compared from the start of the local day.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateField {
    pub name: &'static str,
    pub kind: DateKind,
}

impl DateField {
    pub const fn date(name: &'static str) -> Self {
        Self {
            name,
            kind: DateKind::Date,
        }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self {
            name,
            kind: DateKind::Timestamp,
        }
    }

    fn bound(&self, window: DateWindow, zone: &LocalZone) -> Option<DateBound> {
        let start = window.start(zone.today())?;
        let from = match self.kind {
            DateKind::Date => DateFrom::Day(start),
            DateKind::Timestamp => DateFrom::Instant(zone.start_of_day(start)),
        };
        Some(DateBound {
            column: self.name,
            from,
        })
    }
}

/// A stored row decoded through its record type.
#[derive(Debug, Clone)]
pub struct DecodedRow {
    pub id: i64,
    pub owner: Option<UserId>,
    pub record: Value,
}

impl Owned for DecodedRow {
    fn owner_id(&self) -> Option<UserId> {
        self.owner
    }
}

#[derive(Debug)]
pub enum CodecError {
    Invalid(FieldErrors),
    Malformed(serde_json::Error),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Malformed(err)
    }
}

/// Type-erased bridge between stored JSON rows and a [`TableRecord`].
pub trait RecordCodec: Send + Sync {
    fn decode(&self, row: Value) -> Result<DecodedRow, serde_json::Error>;
    fn create(&self, values: &BoundValues, owner: UserId) -> Result<Value, CodecError>;
    fn apply(&self, row: Value, values: &BoundValues) -> Result<Value, CodecError>;
}

struct FixedTable<R>(PhantomData<fn() -> R>);

impl<R: TableRecord> RecordCodec for FixedTable<R> {
    fn decode(&self, row: Value) -> Result<DecodedRow, serde_json::Error> {
        let record: R = serde_json::from_value(row)?;
        Ok(DecodedRow {
            id: record.id(),
            owner: record.owner_id(),
            record: serde_json::to_value(&record)?,
        })
    }

    fn create(&self, values: &BoundValues, owner: UserId) -> Result<Value, CodecError> {
        let record = R::from_form(values, owner).map_err(CodecError::Invalid)?;
        Ok(serde_json::to_value(&record)?)
    }

    fn apply(&self, row: Value, values: &BoundValues) -> Result<Value, CodecError> {
        let mut record: R = serde_json::from_value(row)?;
        record.apply_form(values).map_err(CodecError::Invalid)?;
        Ok(serde_json::to_value(&record)?)
    }
}

pub struct TableConfig {
    pub key: &'static str,
    pub label: &'static str,
    pub search_fields: &'static [&'static str],
    pub date_field: Option<DateField>,
    pub form: CompiledForm,
    pub schema: &'static TableSchema,
    codec: Box<dyn RecordCodec>,
}

impl std::fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableConfig")
            .field("key", &self.key)
            .field("table", &self.schema.table)
            .finish()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("table key {0} registered twice")]
    DuplicateKey(String),
    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },
}

#[derive(Debug)]
pub struct TableRegistry {
    tables: Vec<TableConfig>,
}

#[derive(Default)]
pub struct TableRegistryBuilder {
    tables: Vec<TableConfig>,
}

impl TableRegistryBuilder {
    pub fn register<R: TableRecord>(
        mut self,
        key: &'static str,
        label: &'static str,
        search_fields: &'static [&'static str],
        date_field: Option<DateField>,
    ) -> Self {
        self.tables.push(TableConfig {
            key,
            label,
            search_fields,
            date_field,
            form: CompiledForm::compile(R::editable_fields()),
            schema: R::schema(),
            codec: Box::new(FixedTable::<R>(PhantomData)),
        });
        self
    }

    pub fn build(self) -> Result<TableRegistry, RegistryError> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.key) {
                return Err(RegistryError::DuplicateKey(table.key.to_string()));
            }
            let mut columns: Vec<&str> = table.search_fields.to_vec();
            columns.extend(table.date_field.map(|d| d.name));
            columns.extend(table.form.keys());
            for column in columns {
                if !table.schema.has_column(column) {
                    return Err(RegistryError::UnknownColumn {
                        table: table.schema.table.to_string(),
                        column: column.to_string(),
                    });
                }
            }
        }
        Ok(TableRegistry {
            tables: self.tables,
        })
    }
}

impl TableRegistry {
    pub fn builder() -> TableRegistryBuilder {
        TableRegistryBuilder::default()
    }

    /// Health checks and diabetes risk assessments.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::builder()
            .register::<HealthCheck>(
                "healthchecks",
                "Health Checks",
                &["forename", "surname", "postcode", "gp", "risk"],
                Some(DateField::date("check_date")),
            )
            .register::<DiabetesRiskAssessment>(
                "diabetes",
                "Diabetes Risk Assessments",
                &["forename", "surname", "postcode", "gp"],
                Some(DateField::timestamp("submitted_at")),
            )
            .build()
    }

    pub fn get(&self, key: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableConfig> {
        self.tables.iter()
    }

    fn lookup(&self, key: &str) -> Result<&TableConfig, CrmError> {
        self.get(key).ok_or_else(|| CrmError::not_found("table"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableQuery {
    pub q: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub id: i64,
    pub record: Value,
    pub can_manage: bool,
}

#[derive(Debug, Serialize)]
pub struct TableListing {
    pub key: &'static str,
    pub label: &'static str,
    pub q: String,
    pub date: DateWindow,
    pub can_add: bool,
    pub fields: Vec<FieldSpec>,
    pub rows: Vec<RowView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditableRow {
    pub id: i64,
    pub fields: Vec<FieldSpec>,
    pub values: RawInput,
    pub errors: FieldErrors,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InlineOutcome {
    Saved(RowView),
    Invalid(EditableRow),
}

fn row_view(viewer: &User, row: DecodedRow) -> RowView {
    RowView {
        id: row.id,
        can_manage: can_manage_record(viewer, &row),
        record: row.record,
    }
}

fn invalid(errors: FieldErrors, raw: &RawInput) -> CrmError {
    CrmError::Validation(ValidationFailure::new(errors, raw.clone()))
}

fn decode(table: &TableConfig, row: Value) -> Result<DecodedRow, CrmError> {
    Ok(table.codec.decode(row).map_err(StoreError::from)?)
}

fn codec_failure(err: CodecError, raw: &RawInput) -> CrmError {
    match err {
        CodecError::Invalid(errors) => invalid(errors, raw),
        CodecError::Malformed(e) => StoreError::from(e).into(),
    }
}

fn table_for<'r>(
    registry: &'r TableRegistry,
    viewer: &User,
    key: &str,
    operation: &'static str,
) -> Result<&'r TableConfig, CrmError> {
    ensure(can_access_tables(viewer), viewer, operation)?;
    registry.lookup(key)
}

/// A row the viewer can see; hidden rows look missing.
async fn visible_row(
    store: &dyn Store,
    table: &TableConfig,
    viewer: &User,
    id: i64,
) -> Result<(Value, DecodedRow), CrmError> {
    let raw = store
        .get_record(table.schema, id)
        .await?
        .ok_or_else(|| CrmError::not_found("record"))?;
    let row = decode(table, raw.clone())?;
    if let Some(owner) = visibility_scope(viewer) {
        if row.owner != Some(owner) {
            tracing::warn!(
                "Access denied: user {} attempted to view {} {}",
                viewer.id,
                table.key,
                id
            );
            return Err(CrmError::AccessDenied {
                operation: "view record",
            });
        }
    }
    Ok((raw, row))
}

async fn manageable_row(
    store: &dyn Store,
    table: &TableConfig,
    viewer: &User,
    id: i64,
    operation: &'static str,
) -> Result<(Value, DecodedRow), CrmError> {
    let (raw, row) = visible_row(store, table, viewer, id).await?;
    ensure(can_manage_record(viewer, &row), viewer, operation)?;
    Ok((raw, row))
}

pub async fn list(
    registry: &TableRegistry,
    store: &dyn Store,
    zone: &LocalZone,
    viewer: &User,
    key: &str,
    query: &TableQuery,
) -> Result<TableListing, CrmError> {
    let table = table_for(registry, viewer, key, "list table")?;

    let needle = query.q.as_deref().map(str::trim).unwrap_or_default().to_string();
    let window = DateWindow::parse(query.date.as_deref());
    let filter = RecordFilter {
        owner: visibility_scope(viewer),
        search: (!needle.is_empty()).then(|| TextSearch {
            needle: needle.clone(),
            columns: table.search_fields.to_vec(),
        }),
        since: table.date_field.and_then(|d| d.bound(window, zone)),
        limit: Some(LIST_LIMIT),
    };

    let rows = store
        .query_records(table.schema, &filter)
        .await?
        .into_iter()
        .map(|raw| decode(table, raw).map(|row| row_view(viewer, row)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TableListing {
        key: table.key,
        label: table.label,
        q: needle,
        date: window,
        can_add: can_add_records(viewer),
        fields: table.form.fields().to_vec(),
        rows,
    })
}

pub async fn show(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    id: i64,
) -> Result<RowView, CrmError> {
    let table = table_for(registry, viewer, key, "view record")?;
    let (_, row) = visible_row(store, table, viewer, id).await?;
    Ok(row_view(viewer, row))
}

pub async fn add(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    raw: &RawInput,
) -> Result<RowView, CrmError> {
    let table = table_for(registry, viewer, key, "add record")?;
    ensure(can_add_records(viewer), viewer, "add record")?;

    let values = table.form.bind(raw).map_err(|errors| invalid(errors, raw))?;
    let row = table
        .codec
        .create(&values, viewer.id)
        .map_err(|e| codec_failure(e, raw))?;
    let stored = store.insert_record(table.schema, row).await?;
    let row = decode(table, stored)?;
    tracing::info!("Record {} added to {} by user {}", row.id, table.key, viewer.id);
    Ok(row_view(viewer, row))
}

pub async fn edit(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    id: i64,
    raw: &RawInput,
) -> Result<RowView, CrmError> {
    let table = table_for(registry, viewer, key, "edit record")?;
    let (current, _) = manageable_row(store, table, viewer, id, "edit record").await?;
    let values = table.form.bind(raw).map_err(|errors| invalid(errors, raw))?;
    save(store, table, viewer, id, current, &values, raw).await
}

async fn save(
    store: &dyn Store,
    table: &TableConfig,
    viewer: &User,
    id: i64,
    current: Value,
    values: &BoundValues,
    raw: &RawInput,
) -> Result<RowView, CrmError> {
    let updated = table
        .codec
        .apply(current, values)
        .map_err(|e| codec_failure(e, raw))?;
    let stored = store
        .update_record(table.schema, id, updated)
        .await?
        .ok_or_else(|| CrmError::not_found("record"))?;
    tracing::info!("Record {} in {} edited by user {}", id, table.key, viewer.id);
    Ok(row_view(viewer, decode(table, stored)?))
}

pub async fn delete(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    id: i64,
) -> Result<(), CrmError> {
    let table = table_for(registry, viewer, key, "delete record")?;
    manageable_row(store, table, viewer, id, "delete record").await?;
    if !store.delete_record(table.schema, id).await? {
        return Err(CrmError::not_found("record"));
    }
    tracing::info!("Record {} deleted from {} by user {}", id, table.key, viewer.id);
    Ok(())
}

/// Current values of one row as editable raw input.
pub async fn inline_edit(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    id: i64,
) -> Result<EditableRow, CrmError> {
    let table = table_for(registry, viewer, key, "edit record")?;
    let (_, row) = manageable_row(store, table, viewer, id, "edit record").await?;
    Ok(EditableRow {
        id,
        fields: table.form.fields().to_vec(),
        values: table.form.raw_from_json(&row.record),
        errors: FieldErrors::new(),
    })
}

/// Like [`edit`], but validation failures come back as the editable row.
pub async fn inline_save(
    registry: &TableRegistry,
    store: &dyn Store,
    viewer: &User,
    key: &str,
    id: i64,
    raw: &RawInput,
) -> Result<InlineOutcome, CrmError> {
    let table = table_for(registry, viewer, key, "edit record")?;
    let (current, _) = manageable_row(store, table, viewer, id, "edit record").await?;

    let editable = |errors: FieldErrors| EditableRow {
        id,
        fields: table.form.fields().to_vec(),
        values: raw.clone(),
        errors,
    };

    let values = match table.form.bind(raw) {
        Ok(values) => values,
        Err(errors) => return Ok(InlineOutcome::Invalid(editable(errors))),
    };
    match save(store, table, viewer, id, current, &values, raw).await {
        Ok(view) => Ok(InlineOutcome::Saved(view)),
        Err(CrmError::Validation(failure)) => Ok(InlineOutcome::Invalid(editable(failure.errors))),
        Err(other) => Err(other),
    }
}

/// Typed rows of one record type visible to `viewer`, newest first.
pub async fn visible_records<R: TableRecord>(
    store: &dyn Store,
    viewer: &User,
    since: Option<DateBound>,
) -> Result<Vec<R>, CrmError> {
    ensure(can_access_tables(viewer), viewer, "read records")?;
    let filter = RecordFilter {
        owner: visibility_scope(viewer),
        since,
        ..RecordFilter::default()
    };
    store
        .query_records(R::schema(), &filter)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| CrmError::from(StoreError::from(e))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::domain::compiler::RawValue;
    use crate::domain::records::HEALTHCHECK_SCHEMA;
    use crate::testing::{cast, Cast};
    use chrono::{Datelike, Duration, NaiveDate};
    use serde_json::json;

    fn raw(pairs: &[(&str, &str)]) -> RawInput {
        pairs.iter().map(|(k, v)| (k.to_string(), RawValue::from(*v))).collect()
    }

    async fn setup() -> (MemoryStore, Cast, TableRegistry) {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        (store, people, TableRegistry::standard().unwrap())
    }

    async fn insert_check(
        store: &MemoryStore,
        owner: &User,
        forename: &str,
        check_date: Option<NaiveDate>,
    ) -> i64 {
        let row = json!({
            "forename": forename,
            "surname": "Smith",
            "gender": "",
            "ethnicity": "",
            "postcode": "AB1 2CD",
            "gp": "Riverside",
            "risk": "Low",
            "created_by": owner.id,
            "check_date": check_date,
        });
        store.insert_record(&HEALTHCHECK_SCHEMA, row).await.unwrap()["id"]
            .as_i64()
            .unwrap()
    }

    fn ids(listing: &TableListing) -> Vec<i64> {
        listing.rows.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_registry_rejects_duplicate_keys() {
        let err = TableRegistry::builder()
            .register::<HealthCheck>("hc", "A", &["forename"], None)
            .register::<HealthCheck>("hc", "B", &["forename"], None)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey("hc".to_string()));
    }

    #[test]
    fn test_registry_rejects_unknown_columns() {
        let err = TableRegistry::builder()
            .register::<HealthCheck>("hc", "A", &["nickname"], None)
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let (store, people, registry) = setup().await;
        let err = list(
            &registry,
            &store,
            &LocalZone::default(),
            &people.admin,
            "nope",
            &TableQuery::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_volunteers_cannot_reach_tables() {
        let (store, people, registry) = setup().await;
        let err = list(
            &registry,
            &store,
            &LocalZone::default(),
            &people.volunteer,
            "healthchecks",
            &TableQuery::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_staff_see_and_manage_only_their_rows() {
        let (store, people, registry) = setup().await;
        let own = insert_check(&store, &people.staff, "Ann", None).await;
        let other = insert_check(&store, &people.other_staff, "Bob", None).await;
        let zone = LocalZone::default();

        let listing = list(&registry, &store, &zone, &people.staff, "healthchecks", &TableQuery::default())
            .await
            .unwrap();
        assert_eq!(ids(&listing), vec![own]);
        assert!(listing.rows[0].can_manage);
        assert!(!listing.can_add);

        let err = edit(&registry, &store, &people.staff, "healthchecks", other, &raw(&[("forename", "X"), ("surname", "Y")]))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied { .. }));
        let err = delete(&registry, &store, &people.staff, "healthchecks", other)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied { .. }));

        let all = list(&registry, &store, &zone, &people.manager, "healthchecks", &TableQuery::default())
            .await
            .unwrap();
        assert_eq!(ids(&all), vec![other, own]);
        assert!(all.rows.iter().all(|r| r.can_manage));
    }

    #[tokio::test]
    async fn test_add_requires_add_permission_and_sets_owner() {
        let (store, people, registry) = setup().await;
        let input = raw(&[("forename", "Cy"), ("surname", "Doe"), ("bmi", "31.2")]);

        let err = add(&registry, &store, &people.staff, "healthchecks", &input)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied { .. }));

        let view = add(&registry, &store, &people.manager, "healthchecks", &input)
            .await
            .unwrap();
        assert_eq!(view.record["created_by"], json!(people.manager.id));
        assert_eq!(view.record["forename"], json!("Cy"));

        let err = add(&registry, &store, &people.manager, "healthchecks", &raw(&[("forename", "Cy")]))
            .await
            .unwrap_err();
        match err {
            CrmError::Validation(failure) => assert!(failure.errors.contains_key("surname")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_or_across_fields() {
        let (store, people, registry) = setup().await;
        let ann = insert_check(&store, &people.staff, "Ann", None).await;
        insert_check(&store, &people.staff, "Bob", None).await;
        let zone = LocalZone::default();

        let query = TableQuery {
            q: Some("aNN".to_string()),
            date: None,
        };
        let listing = list(&registry, &store, &zone, &people.admin, "healthchecks", &query)
            .await
            .unwrap();
        assert_eq!(ids(&listing), vec![ann]);

        let by_gp = TableQuery {
            q: Some("riverSIDE".to_string()),
            date: None,
        };
        let listing = list(&registry, &store, &zone, &people.admin, "healthchecks", &by_gp)
            .await
            .unwrap();
        assert_eq!(listing.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_month_window_starts_on_the_first() {
        let (store, people, registry) = setup().await;
        let zone = LocalZone::default();
        let first = zone.today().with_day(1).unwrap();
        let previous_last = first - Duration::days(1);

        let inside = insert_check(&store, &people.staff, "In", Some(first)).await;
        insert_check(&store, &people.staff, "Out", Some(previous_last)).await;
        insert_check(&store, &people.staff, "Undated", None).await;

        let query = TableQuery {
            q: None,
            date: Some("month".to_string()),
        };
        let listing = list(&registry, &store, &zone, &people.admin, "healthchecks", &query)
            .await
            .unwrap();
        assert_eq!(ids(&listing), vec![inside]);
        assert_eq!(listing.date, DateWindow::Month);
    }

    #[tokio::test]
    async fn test_timestamp_window_on_diabetes_table() {
        let (store, people, registry) = setup().await;
        let input = raw(&[
            ("forename", "Eve"),
            ("surname", "Stone"),
            ("gender", "M"),
            ("ethnicity", "WHITE"),
            ("age", "55"),
            ("waist_cm", "95"),
            ("height_cm", "180"),
            ("weight_kg", "81"),
            ("family_history", "YES"),
            ("high_bp", "NO"),
        ]);
        let view = add(&registry, &store, &people.admin, "diabetes", &input)
            .await
            .unwrap();
        assert_eq!(view.record["total_score"], json!(18));

        let query = TableQuery {
            q: None,
            date: Some("today".to_string()),
        };
        let listing = list(&registry, &store, &LocalZone::default(), &people.admin, "diabetes", &query)
            .await
            .unwrap();
        assert_eq!(ids(&listing), vec![view.id]);
    }

    #[tokio::test]
    async fn test_inline_edit_round_trip_and_invalid_save() {
        let (store, people, registry) = setup().await;
        let id = insert_check(&store, &people.staff, "Ann", None).await;

        let editable = inline_edit(&registry, &store, &people.staff, "healthchecks", id)
            .await
            .unwrap();
        assert_eq!(editable.values["forename"], RawValue::from("Ann"));
        assert!(editable.errors.is_empty());

        let mut input = editable.values.clone();
        input.insert("age".to_string(), RawValue::from("forty"));
        match inline_save(&registry, &store, &people.staff, "healthchecks", id, &input)
            .await
            .unwrap()
        {
            InlineOutcome::Invalid(row) => {
                assert!(row.errors.contains_key("age"));
                assert_eq!(row.values["age"], RawValue::from("forty"));
            }
            InlineOutcome::Saved(_) => panic!("invalid input was saved"),
        }
        let unchanged = show(&registry, &store, &people.staff, "healthchecks", id)
            .await
            .unwrap();
        assert_eq!(unchanged.record["age"], Value::Null);

        input.insert("age".to_string(), RawValue::from("40"));
        match inline_save(&registry, &store, &people.staff, "healthchecks", id, &input)
            .await
            .unwrap()
        {
            InlineOutcome::Saved(row) => {
                assert_eq!(row.record["age"], json!(40));
                assert_eq!(row.record["created_by"], json!(people.staff.id));
            }
            InlineOutcome::Invalid(row) => panic!("rejected: {:?}", row.errors),
        }
    }

    #[tokio::test]
    async fn test_hidden_row_looks_missing() {
        let (store, people, registry) = setup().await;
        let other = insert_check(&store, &people.other_staff, "Bob", None).await;
        let err = show(&registry, &store, &people.staff, "healthchecks", other)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied { .. }));
        let err = show(&registry, &store, &people.staff, "healthchecks", 9999)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_visible_records_are_typed_and_scoped() {
        let (store, people, _) = setup().await;
        insert_check(&store, &people.staff, "Ann", None).await;
        insert_check(&store, &people.other_staff, "Bob", None).await;

        let mine: Vec<HealthCheck> = visible_records(&store, &people.staff, None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].forename, "Ann");

        let all: Vec<HealthCheck> = visible_records(&store, &people.admin, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
