use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;

/// Semi-structured answers of a submission, keyed by field key.
pub type Answers = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Manager,
    Staff,
    Volunteer,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Option<UserRole>,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "form_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FormKind {
    #[default]
    Generic,
    Healthcheck,
    Coffee,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "field_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Decimal,
    Date,
    Choice,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct FormDefinition {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub kind: FormKind,
    pub is_system: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct FormField {
    pub id: i64,
    pub form_id: i64,
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub choices_text: String,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    pub is_displayed: bool,
}

impl FormField {
    /// One option per non-blank line, trimmed, in file order.
    pub fn choices(&self) -> Vec<String> {
        parse_choices(&self.choices_text)
    }
}

pub fn parse_choices(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sort key for rendering: `order` ascending, ties by `id`.
pub fn sort_fields(fields: &mut [FormField]) {
    fields.sort_by_key(|f| (f.order, f.id));
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct FormSubmission {
    pub id: i64,
    pub form_id: i64,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    #[sqlx(json)]
    pub answers: Answers,
}

#[derive(Clone, Debug, Serialize, FromRow)]
pub struct SubmissionRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: FormSubmission,
    pub submitted_by_name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub hash: String,
    pub role: Option<UserRole>,
    pub is_superuser: bool,
}

#[derive(Debug, Clone)]
pub struct NewFormDefinition {
    pub name: String,
    pub description: String,
    pub kind: FormKind,
    pub is_system: bool,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewFormField {
    pub form_id: i64,
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub choices_text: String,
    pub is_displayed: bool,
}
