pub mod memory;
pub mod postgres;
pub mod seed;

use crate::domain::models::{
    Answers, FormDefinition, FormField, FormSubmission, NewFormDefinition, NewFormField, NewUser,
    SubmissionRow, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique, foreign-key or check constraint violated.
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("malformed stored row: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => {
                    return StoreError::Integrity(db_err.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Static shape of a fixed-schema record table.
#[derive(Debug)]
pub struct TableSchema {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub created_column: &'static str,
    /// Writable columns, owner included; `id` and the created column are store-assigned.
    pub columns: &'static [&'static str],
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        name == "id"
            || name == self.created_column
            || self.columns.iter().any(|c| *c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateFrom {
    /// Compare a DATE column against a local date.
    Day(NaiveDate),
    /// Compare a timestamp column against the instant local day starts.
    Instant(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateBound {
    pub column: &'static str,
    pub from: DateFrom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub needle: String,
    pub columns: Vec<&'static str>,
}

/// Filter for fixed-record queries; results are always newest id first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub owner: Option<UserId>,
    pub search: Option<TextSearch>,
    pub since: Option<DateBound>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionQuery {
    pub form_id: i64,
    pub submitted_by: Option<UserId>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;
    /// Active user plus password hash, for login.
    async fn find_login(&self, email: &str) -> StoreResult<Option<(User, String)>>;
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<bool>;
    /// Fails with `Integrity` while the user still owns records or submissions.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    async fn insert_definition(&self, def: NewFormDefinition) -> StoreResult<FormDefinition>;
    async fn get_definition(&self, id: i64) -> StoreResult<Option<FormDefinition>>;
    /// Newest first. `visible_to` limits to forms authored by that user plus system forms.
    async fn list_definitions(&self, visible_to: Option<UserId>) -> StoreResult<Vec<FormDefinition>>;
    /// Cascades to fields and submissions.
    async fn delete_definition(&self, id: i64) -> StoreResult<bool>;

    /// Sorted by (order, id).
    async fn list_fields(&self, form_id: i64) -> StoreResult<Vec<FormField>>;
    async fn get_field(&self, id: i64) -> StoreResult<Option<FormField>>;
    /// Appends after the current highest order; duplicate keys fail with `Integrity`.
    async fn insert_field(&self, field: NewFormField) -> StoreResult<FormField>;
    async fn update_field(&self, field: &FormField) -> StoreResult<FormField>;
    async fn delete_field(&self, id: i64) -> StoreResult<bool>;
    /// Applies all `(field_id, order)` pairs atomically; ids outside the form are skipped.
    async fn reorder_fields(&self, form_id: i64, orders: &[(i64, i32)]) -> StoreResult<()>;

    async fn insert_submission(
        &self,
        form_id: i64,
        submitted_by: UserId,
        answers: Answers,
    ) -> StoreResult<FormSubmission>;
    async fn query_submissions(&self, query: &SubmissionQuery) -> StoreResult<Vec<SubmissionRow>>;

    async fn query_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<Value>>;
    /// Rows matching `filter`; its limit is ignored.
    async fn count_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<u64>;
    async fn get_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<Option<Value>>;
    async fn insert_record(&self, schema: &'static TableSchema, row: Value) -> StoreResult<Value>;
    async fn update_record(
        &self,
        schema: &'static TableSchema,
        id: i64,
        row: Value,
    ) -> StoreResult<Option<Value>>;
    async fn delete_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<bool>;
}
