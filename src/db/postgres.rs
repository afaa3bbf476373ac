use super::{
    DateFrom, RecordFilter, Store, StoreResult, SubmissionQuery, TableSchema,
};
use crate::domain::models::{
    Answers, FormDefinition, FormField, FormSubmission, NewFormDefinition, NewFormField, NewUser,
    SubmissionRow, User, UserId,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

const USER_COLUMNS: &str =
    "id, email, display_name, role, is_superuser, is_active, created_at";
const DEFINITION_COLUMNS: &str =
    "id, name, description, kind, is_system, created_by, created_at";
const FIELD_COLUMNS: &str =
    "id, form_id, key, label, field_type, required, choices_text, sort_order, is_displayed";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct LoginRow {
    #[sqlx(flatten)]
    user: User,
    hash: String,
}

/// `ILIKE` pattern matching `needle` literally anywhere.
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_record_filter(qb: &mut QueryBuilder<'_, Postgres>, schema: &TableSchema, filter: &RecordFilter) {
    if let Some(owner) = filter.owner {
        qb.push(format!(" AND t.{} = ", schema.owner_column));
        qb.push_bind(owner);
    }

    if let Some(search) = filter.search.as_ref().filter(|s| !s.columns.is_empty()) {
        let pattern = contains_pattern(&search.needle);
        qb.push(" AND (");
        for (idx, column) in search.columns.iter().enumerate() {
            if idx > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("t.{column}::text ILIKE "));
            qb.push_bind(pattern.clone());
        }
        qb.push(")");
    }

    if let Some(bound) = &filter.since {
        qb.push(format!(" AND t.{} >= ", bound.column));
        match bound.from {
            DateFrom::Day(day) => qb.push_bind(day),
            DateFrom::Instant(instant) => qb.push_bind(instant),
        };
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_login(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let row = sqlx::query_as::<_, LoginRow>(&format!(
            "SELECT {USER_COLUMNS}, hash FROM users WHERE email = $1 AND is_active = true"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.user, r.hash)))
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, hash, display_name, role, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.hash)
        .bind(&new.display_name)
        .bind(new.role)
        .bind(new.is_superuser)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        // Owned rows reference users with ON DELETE RESTRICT.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_definition(&self, new: NewFormDefinition) -> StoreResult<FormDefinition> {
        let def = sqlx::query_as::<_, FormDefinition>(&format!(
            r#"
            INSERT INTO form_definitions (name, description, kind, is_system, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {DEFINITION_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.kind)
        .bind(new.is_system)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(def)
    }

    async fn get_definition(&self, id: i64) -> StoreResult<Option<FormDefinition>> {
        let def = sqlx::query_as::<_, FormDefinition>(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM form_definitions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(def)
    }

    async fn list_definitions(&self, visible_to: Option<UserId>) -> StoreResult<Vec<FormDefinition>> {
        let defs = sqlx::query_as::<_, FormDefinition>(&format!(
            r#"
            SELECT {DEFINITION_COLUMNS}
            FROM form_definitions
            WHERE $1::BIGINT IS NULL OR is_system OR created_by = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(visible_to)
        .fetch_all(&self.pool)
        .await?;
        Ok(defs)
    }

    async fn delete_definition(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM form_definitions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_fields(&self, form_id: i64) -> StoreResult<Vec<FormField>> {
        let fields = sqlx::query_as::<_, FormField>(&format!(
            "SELECT {FIELD_COLUMNS} FROM form_fields WHERE form_id = $1 ORDER BY sort_order, id"
        ))
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fields)
    }

    async fn get_field(&self, id: i64) -> StoreResult<Option<FormField>> {
        let field = sqlx::query_as::<_, FormField>(&format!(
            "SELECT {FIELD_COLUMNS} FROM form_fields WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(field)
    }

    async fn insert_field(&self, new: NewFormField) -> StoreResult<FormField> {
        let field = sqlx::query_as::<_, FormField>(&format!(
            r#"
            INSERT INTO form_fields
                (form_id, key, label, field_type, required, choices_text, sort_order, is_displayed)
            SELECT $1, $2, $3, $4, $5, $6, COALESCE(MAX(sort_order) + 1, 0), $7
            FROM form_fields
            WHERE form_id = $1
            RETURNING {FIELD_COLUMNS}
            "#
        ))
        .bind(new.form_id)
        .bind(&new.key)
        .bind(&new.label)
        .bind(new.field_type)
        .bind(new.required)
        .bind(&new.choices_text)
        .bind(new.is_displayed)
        .fetch_one(&self.pool)
        .await?;
        Ok(field)
    }

    async fn update_field(&self, field: &FormField) -> StoreResult<FormField> {
        let updated = sqlx::query_as::<_, FormField>(&format!(
            r#"
            UPDATE form_fields
            SET key = $2, label = $3, field_type = $4, required = $5,
                choices_text = $6, sort_order = $7, is_displayed = $8
            WHERE id = $1
            RETURNING {FIELD_COLUMNS}
            "#
        ))
        .bind(field.id)
        .bind(&field.key)
        .bind(&field.label)
        .bind(field.field_type)
        .bind(field.required)
        .bind(&field.choices_text)
        .bind(field.order)
        .bind(field.is_displayed)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_field(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM form_fields WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reorder_fields(&self, form_id: i64, orders: &[(i64, i32)]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (field_id, order) in orders {
            sqlx::query("UPDATE form_fields SET sort_order = $1 WHERE id = $2 AND form_id = $3")
                .bind(order)
                .bind(field_id)
                .bind(form_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_submission(
        &self,
        form_id: i64,
        submitted_by: UserId,
        answers: Answers,
    ) -> StoreResult<FormSubmission> {
        let submission = sqlx::query_as::<_, FormSubmission>(
            r#"
            INSERT INTO form_submissions (form_id, submitted_by, answers)
            VALUES ($1, $2, $3)
            RETURNING id, form_id, submitted_by, submitted_at, answers
            "#,
        )
        .bind(form_id)
        .bind(submitted_by)
        .bind(sqlx::types::Json(&answers))
        .fetch_one(&self.pool)
        .await?;
        Ok(submission)
    }

    async fn query_submissions(&self, query: &SubmissionQuery) -> StoreResult<Vec<SubmissionRow>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT s.id, s.form_id, s.submitted_by, s.submitted_at, s.answers,
                   u.display_name AS submitted_by_name
            FROM form_submissions s
            JOIN users u ON u.id = s.submitted_by
            WHERE s.form_id = $1
              AND ($2::BIGINT IS NULL OR s.submitted_by = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR s.submitted_at >= $3)
            ORDER BY s.id DESC
            LIMIT $4
            "#,
        )
        .bind(query.form_id)
        .bind(query.submitted_by)
        .bind(query.since)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn query_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT to_jsonb(t) FROM {} t WHERE TRUE",
            schema.table
        ));
        push_record_filter(&mut qb, schema, filter);
        qb.push(" ORDER BY t.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb.build_query_as::<(Value,)>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(row,)| row).collect())
    }

    async fn count_records(
        &self,
        schema: &'static TableSchema,
        filter: &RecordFilter,
    ) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) FROM {} t WHERE TRUE",
            schema.table
        ));
        push_record_filter(&mut qb, schema, filter);

        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn get_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<Option<Value>> {
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "SELECT to_jsonb(t) FROM {} t WHERE t.id = $1",
            schema.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn insert_record(&self, schema: &'static TableSchema, row: Value) -> StoreResult<Value> {
        let columns = schema.columns.join(", ");
        let selected = schema
            .columns
            .iter()
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            INSERT INTO {table} AS t ({columns})
            SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1) r
            RETURNING to_jsonb(t)
            "#,
            table = schema.table,
        );
        let (stored,): (Value,) = sqlx::query_as(&sql)
            .bind(row)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn update_record(
        &self,
        schema: &'static TableSchema,
        id: i64,
        row: Value,
    ) -> StoreResult<Option<Value>> {
        let columns = schema.columns.join(", ");
        let selected = schema
            .columns
            .iter()
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            UPDATE {table} AS t
            SET ({columns}) = (SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1) r)
            WHERE t.id = $2
            RETURNING to_jsonb(t)
            "#,
            table = schema.table,
        );
        let stored: Option<(Value,)> = sqlx::query_as(&sql)
            .bind(row)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stored.map(|(v,)| v))
    }

    async fn delete_record(&self, schema: &'static TableSchema, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", schema.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
