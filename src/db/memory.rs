//! In-process store with the same semantics as the Postgres schema: unique
//! `(form, key)`, cascades, owner protection, and reorders applied under one
//! write lock.

use super::{
    DateFrom, RecordFilter, Store, StoreError, StoreResult, SubmissionQuery, TableSchema,
};
use crate::domain::models::{
    sort_fields, Answers, FormDefinition, FormField, FormSubmission, NewFormDefinition,
    NewFormField, NewUser, SubmissionRow, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    sequences: HashMap<&'static str, i64>,
    users: BTreeMap<UserId, (User, String)>,
    definitions: BTreeMap<i64, FormDefinition>,
    fields: BTreeMap<i64, FormField>,
    submissions: BTreeMap<i64, FormSubmission>,
    tables: HashMap<&'static str, MemoryTable>,
}

struct MemoryTable {
    owner_column: &'static str,
    rows: BTreeMap<i64, Value>,
}

impl MemoryState {
    fn next_id(&mut self, sequence: &'static str) -> i64 {
        let counter = self.sequences.entry(sequence).or_insert(0);
        *counter += 1;
        *counter
    }

    fn table(&mut self, schema: &'static TableSchema) -> &mut MemoryTable {
        self.tables.entry(schema.table).or_insert_with(|| MemoryTable {
            owner_column: schema.owner_column,
            rows: BTreeMap::new(),
        })
    }

    fn key_taken(&self, form_id: i64, key: &str, except: Option<i64>) -> bool {
        self.fields
            .values()
            .any(|f| f.form_id == form_id && f.key == key && Some(f.id) != except)
    }

    fn owns_anything(&self, user_id: UserId) -> bool {
        self.submissions.values().any(|s| s.submitted_by == user_id)
            || self.tables.values().any(|t| {
                t.rows
                    .values()
                    .any(|row| row.get(t.owner_column).and_then(Value::as_i64) == Some(user_id))
            })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn row_matches(row: &Value, owner_column: &str, filter: &RecordFilter) -> bool {
    if let Some(owner) = filter.owner {
        if row.get(owner_column).and_then(Value::as_i64) != Some(owner) {
            return false;
        }
    }

    if let Some(search) = &filter.search {
        let needle = search.needle.to_lowercase();
        let hit = search.columns.iter().any(|column| {
            row.get(*column)
                .and_then(value_text)
                .map(|text| text.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
        if !hit {
            return false;
        }
    }

    if let Some(bound) = &filter.since {
        let raw = row.get(bound.column).and_then(Value::as_str);
        let included = match (raw, bound.from) {
            (Some(raw), DateFrom::Day(start)) => raw
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(|d| d >= start)
                .unwrap_or(false),
            (Some(raw), DateFrom::Instant(start)) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc) >= start)
                .unwrap_or(false),
            (None, _) => false,
        };
        if !included {
            return false;
        }
    }

    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn find_login(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|(user, _)| user.email == email && user.is_active)
            .cloned())
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|(u, _)| u.email == new.email) {
            return Err(StoreError::Integrity(format!(
                "user with email {} already exists",
                new.email
            )));
        }
        let user = User {
            id: state.next_id("users"),
            email: new.email,
            display_name: new.display_name,
            role: new.role,
            is_superuser: new.is_superuser,
            is_active: true,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, (user.clone(), new.hash));
        Ok(user)
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id) {
            Some((user, _)) => {
                user.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Ok(false);
        }
        if state.owns_anything(id) {
            return Err(StoreError::Integrity(format!(
                "user {id} still owns records"
            )));
        }
        for def in state.definitions.values_mut() {
            if def.created_by == Some(id) {
                def.created_by = None;
            }
        }
        state.users.remove(&id);
        Ok(true)
    }

    async fn insert_definition(&self, new: NewFormDefinition) -> StoreResult<FormDefinition> {
        let mut state = self.state.write().await;
        let def = FormDefinition {
            id: state.next_id("form_definitions"),
            name: new.name,
            description: new.description,
            kind: new.kind,
            is_system: new.is_system,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        state.definitions.insert(def.id, def.clone());
        Ok(def)
    }

    async fn get_definition(&self, id: i64) -> StoreResult<Option<FormDefinition>> {
        let state = self.state.read().await;
        Ok(state.definitions.get(&id).cloned())
    }

    async fn list_definitions(&self, visible_to: Option<UserId>) -> StoreResult<Vec<FormDefinition>> {
        let state = self.state.read().await;
        let mut defs: Vec<FormDefinition> = state
            .definitions
            .values()
            .filter(|d| match visible_to {
                Some(user_id) => d.is_system || d.created_by == Some(user_id),
                None => true,
            })
            .cloned()
            .collect();
        defs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(defs)
    }

    async fn delete_definition(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.definitions.remove(&id).is_none() {
            return Ok(false);
        }
        state.fields.retain(|_, f| f.form_id != id);
        state.submissions.retain(|_, s| s.form_id != id);
        Ok(true)
    }

    async fn list_fields(&self, form_id: i64) -> StoreResult<Vec<FormField>> {
        let state = self.state.read().await;
        let mut fields: Vec<FormField> = state
            .fields
            .values()
            .filter(|f| f.form_id == form_id)
            .cloned()
            .collect();
        sort_fields(&mut fields);
        Ok(fields)
    }

    async fn get_field(&self, id: i64) -> StoreResult<Option<FormField>> {
        let state = self.state.read().await;
        Ok(state.fields.get(&id).cloned())
    }

    async fn insert_field(&self, new: NewFormField) -> StoreResult<FormField> {
        let mut state = self.state.write().await;
        if !state.definitions.contains_key(&new.form_id) {
            return Err(StoreError::Integrity(format!(
                "form {} does not exist",
                new.form_id
            )));
        }
        if state.key_taken(new.form_id, &new.key, None) {
            return Err(StoreError::Integrity(format!(
                "field key {} already exists on form {}",
                new.key, new.form_id
            )));
        }
        let order = state
            .fields
            .values()
            .filter(|f| f.form_id == new.form_id)
            .map(|f| f.order + 1)
            .max()
            .unwrap_or(0);
        let field = FormField {
            id: state.next_id("form_fields"),
            form_id: new.form_id,
            key: new.key,
            label: new.label,
            field_type: new.field_type,
            required: new.required,
            choices_text: new.choices_text,
            order,
            is_displayed: new.is_displayed,
        };
        state.fields.insert(field.id, field.clone());
        Ok(field)
    }

    async fn update_field(&self, field: &FormField) -> StoreResult<FormField> {
        let mut state = self.state.write().await;
        if state.key_taken(field.form_id, &field.key, Some(field.id)) {
            return Err(StoreError::Integrity(format!(
                "field key {} already exists on form {}",
                field.key, field.form_id
            )));
        }
        match state.fields.get_mut(&field.id) {
            Some(existing) => {
                *existing = field.clone();
                Ok(field.clone())
            }
            None => Err(StoreError::Database(sqlx::Error::RowNotFound)),
        }
    }

    async fn delete_field(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.fields.remove(&id).is_some())
    }

    async fn reorder_fields(&self, form_id: i64, orders: &[(i64, i32)]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for (field_id, order) in orders {
            if let Some(field) = state.fields.get_mut(field_id) {
                if field.form_id == form_id {
                    field.order = *order;
                }
            }
        }
        Ok(())
    }

    async fn insert_submission(
        &self,
        form_id: i64,
        submitted_by: UserId,
        answers: Answers,
    ) -> StoreResult<FormSubmission> {
        let mut state = self.state.write().await;
        if !state.definitions.contains_key(&form_id) || !state.users.contains_key(&submitted_by) {
            return Err(StoreError::Integrity(
                "submission references a missing form or user".to_string(),
            ));
        }
        let submission = FormSubmission {
            id: state.next_id("form_submissions"),
            form_id,
            submitted_by,
            submitted_at: Utc::now(),
            answers,
        };
        state.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn query_submissions(&self, query: &SubmissionQuery) -> StoreResult<Vec<SubmissionRow>> {
        let state = self.state.read().await;
        Ok(state
            .submissions
            .values()
            .rev()
            .filter(|s| s.form_id == query.form_id)
            .filter(|s| query.submitted_by.map_or(true, |u| s.submitted_by == u))
            .filter(|s| query.since.map_or(true, |since| s.submitted_at >= since))
            .take(query.limit)
            .map(|s| SubmissionRow {
                submission: s.clone(),
                submitted_by_name: state
                    .users
                    .get(&s.submitted_by)
                    .map(|(u, _)| u.display_name.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn query_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<Value>> {
        let state = self.state.read().await;
        let Some(table) = state.tables.get(schema.table) else {
            return Ok(Vec::new());
        };
        let matching = table
            .rows
            .values()
            .rev()
            .filter(|row| row_matches(row, schema.owner_column, filter))
            .cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<u64> {
        let state = self.state.read().await;
        let Some(table) = state.tables.get(schema.table) else {
            return Ok(0);
        };
        let count = table
            .rows
            .values()
            .filter(|row| row_matches(row, schema.owner_column, filter))
            .count();
        Ok(count as u64)
    }

    async fn get_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .tables
            .get(schema.table)
            .and_then(|t| t.rows.get(&id))
            .cloned())
    }

    async fn insert_record(&self, schema: &'static TableSchema, row: Value) -> StoreResult<Value> {
        let mut state = self.state.write().await;
        let owner = row.get(schema.owner_column).and_then(Value::as_i64);
        if !owner.map_or(false, |id| state.users.contains_key(&id)) {
            return Err(StoreError::Integrity(format!(
                "{} must reference an existing user",
                schema.owner_column
            )));
        }

        let id = state.next_id(schema.table);
        let mut stored = serde_json::Map::new();
        stored.insert("id".to_string(), Value::from(id));
        for column in schema.columns {
            stored.insert(
                column.to_string(),
                row.get(*column).cloned().unwrap_or(Value::Null),
            );
        }
        stored.insert(
            schema.created_column.to_string(),
            serde_json::to_value(Utc::now())?,
        );

        let stored = Value::Object(stored);
        state.table(schema).rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_record(
        &self,
        schema: &'static TableSchema,
        id: i64,
        row: Value,
    ) -> StoreResult<Option<Value>> {
        let mut state = self.state.write().await;
        let Some(existing) = state.table(schema).rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Value::Object(map) = existing {
            for column in schema.columns {
                map.insert(
                    column.to_string(),
                    row.get(*column).cloned().unwrap_or(Value::Null),
                );
            }
        }
        Ok(Some(existing.clone()))
    }

    async fn delete_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.table(schema).rows.remove(&id).is_some())
    }
}
