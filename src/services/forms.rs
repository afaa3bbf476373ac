//! Form definitions and their ordered fields.

use crate::db::Store;
use crate::domain::compiler::{CompiledForm, RawInput, RawValue};
use crate::domain::models::{
    parse_choices, FieldType, FormDefinition, FormField, FormKind, NewFormDefinition, NewFormField,
    User,
};
use crate::domain::policy::{can_fill_forms, can_manage_forms, can_view_all, visibility_scope};
use crate::error::{CrmError, ValidationFailure};
use crate::services::ensure;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

pub const KEY_MAX_LEN: usize = 50;
const LABEL_MAX_LEN: usize = 120;
const NAME_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: FormKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    pub label: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices_text: String,
    #[serde(default = "displayed_by_default")]
    pub is_displayed: bool,
}

fn displayed_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldPatch {
    pub label: Option<String>,
    pub key: Option<String>,
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub choices_text: Option<String>,
    pub order: Option<i32>,
    pub is_displayed: Option<bool>,
}

/// Wire name of a serde enum value, e.g. `choice` for `FieldType::Choice`.
fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn echo<I>(pairs: I) -> RawInput
where
    I: IntoIterator<Item = (&'static str, Option<String>)>,
{
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), RawValue::One(v))))
        .collect()
}

impl DefinitionInput {
    fn echo(&self) -> RawInput {
        echo([
            ("name", Some(self.name.clone())),
            ("description", Some(self.description.clone())),
            ("kind", Some(wire_name(&self.kind))),
        ])
    }
}

impl FieldInput {
    fn echo(&self) -> RawInput {
        echo([
            ("label", Some(self.label.clone())),
            ("key", self.key.clone()),
            ("field_type", Some(wire_name(&self.field_type))),
            ("required", Some(self.required.to_string())),
            ("choices_text", Some(self.choices_text.clone())),
            ("is_displayed", Some(self.is_displayed.to_string())),
        ])
    }
}

impl FieldPatch {
    fn echo(&self) -> RawInput {
        echo([
            ("label", self.label.clone()),
            ("key", self.key.clone()),
            ("field_type", self.field_type.as_ref().map(wire_name)),
            ("required", self.required.map(|r| r.to_string())),
            ("choices_text", self.choices_text.clone()),
            ("order", self.order.map(|o| o.to_string())),
            ("is_displayed", self.is_displayed.map(|d| d.to_string())),
        ])
    }
}

fn rejected(failure: ValidationFailure, values: &RawInput) -> CrmError {
    CrmError::Validation(failure.with_values(values.clone()))
}

/// Lowercase ASCII slug with `_` separators, cut to the key column width.
/// Accented letters lose their marks ("Café" gives "cafe").
pub fn slugify_key(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.nfkd().filter(|c| c.is_ascii() || c.is_whitespace()) {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug.truncate(KEY_MAX_LEN);
    slug.trim_matches('_').to_string()
}

fn normalize_key(raw: &str) -> Result<String, ValidationFailure> {
    let key = raw.trim().to_lowercase().replace(' ', "_");
    if key.is_empty() {
        return Err(ValidationFailure::single("key", "This field is required."));
    }
    if key.chars().count() > KEY_MAX_LEN {
        return Err(ValidationFailure::single(
            "key",
            format!("Ensure this value has at most {KEY_MAX_LEN} characters."),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationFailure::single(
            "key",
            "Enter a valid key consisting of letters, numbers, underscores or hyphens.",
        ));
    }
    Ok(key)
}

fn resolve_key(explicit: Option<&str>, label: &str) -> Result<String, ValidationFailure> {
    match explicit.filter(|k| !k.trim().is_empty()) {
        Some(raw) => normalize_key(raw),
        None => {
            let derived = slugify_key(label);
            if derived.is_empty() {
                Err(ValidationFailure::single(
                    "key",
                    "Could not derive a key from the label; enter one explicitly.",
                ))
            } else {
                Ok(derived)
            }
        }
    }
}

fn clean_label(raw: &str) -> Result<String, ValidationFailure> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(ValidationFailure::single("label", "This field is required."));
    }
    if label.chars().count() > LABEL_MAX_LEN {
        return Err(ValidationFailure::single(
            "label",
            format!("Ensure this value has at most {LABEL_MAX_LEN} characters."),
        ));
    }
    Ok(label.to_string())
}

fn check_choices(field_type: FieldType, choices_text: &str) -> Result<(), ValidationFailure> {
    if field_type == FieldType::Choice && parse_choices(choices_text).is_empty() {
        return Err(ValidationFailure::single(
            "choices_text",
            "Choice fields need at least one option, one per line.",
        ));
    }
    Ok(())
}

/// Whether `viewer` may change the schema of `def`.
fn can_edit_schema(viewer: &User, def: &FormDefinition) -> bool {
    can_manage_forms(viewer) && (can_view_all(viewer) || def.created_by == Some(viewer.id))
}

pub async fn create_definition(
    store: &dyn Store,
    viewer: &User,
    input: DefinitionInput,
) -> Result<FormDefinition, CrmError> {
    ensure(can_manage_forms(viewer), viewer, "create form")?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(rejected(
            ValidationFailure::single("name", "This field is required."),
            &input.echo(),
        ));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(rejected(
            ValidationFailure::single(
                "name",
                format!("Ensure this value has at most {NAME_MAX_LEN} characters."),
            ),
            &input.echo(),
        ));
    }

    let def = store
        .insert_definition(NewFormDefinition {
            name: name.to_string(),
            description: input.description.trim().to_string(),
            kind: input.kind,
            is_system: false,
            created_by: Some(viewer.id),
        })
        .await?;
    tracing::info!("Form {} created by user {}", def.id, viewer.id);
    Ok(def)
}

/// Everything for users who can view all; otherwise own forms plus system forms.
pub async fn list_definitions(
    store: &dyn Store,
    viewer: &User,
) -> Result<Vec<FormDefinition>, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "list forms")?;
    Ok(store.list_definitions(visibility_scope(viewer)).await?)
}

/// Any form can be opened and filled by id.
pub async fn get_definition(
    store: &dyn Store,
    viewer: &User,
    id: i64,
) -> Result<FormDefinition, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "open form")?;
    store
        .get_definition(id)
        .await?
        .ok_or_else(|| CrmError::not_found("form"))
}

async fn editable_definition(
    store: &dyn Store,
    viewer: &User,
    id: i64,
    operation: &'static str,
) -> Result<FormDefinition, CrmError> {
    let def = get_definition(store, viewer, id).await?;
    ensure(can_edit_schema(viewer, &def), viewer, operation)?;
    Ok(def)
}

pub async fn delete_definition(store: &dyn Store, viewer: &User, id: i64) -> Result<(), CrmError> {
    let def = editable_definition(store, viewer, id, "delete form").await?;
    if def.is_system {
        return Err(CrmError::Integrity("system forms cannot be deleted".to_string()));
    }
    if !store.delete_definition(def.id).await? {
        return Err(CrmError::not_found("form"));
    }
    tracing::info!("Form {} deleted by user {}", def.id, viewer.id);
    Ok(())
}

pub async fn list_fields(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
) -> Result<Vec<FormField>, CrmError> {
    let def = get_definition(store, viewer, form_id).await?;
    Ok(store.list_fields(def.id).await?)
}

/// The definition plus its fields compiled in render order.
pub async fn compiled_form(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
) -> Result<(FormDefinition, CompiledForm), CrmError> {
    let def = get_definition(store, viewer, form_id).await?;
    let fields = store.list_fields(def.id).await?;
    Ok((def, CompiledForm::from_form_fields(&fields)))
}

pub async fn add_field(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
    input: FieldInput,
) -> Result<FormField, CrmError> {
    let def = editable_definition(store, viewer, form_id, "add field").await?;
    let values = input.echo();
    let label = clean_label(&input.label).map_err(|f| rejected(f, &values))?;
    let key = resolve_key(input.key.as_deref(), &label).map_err(|f| rejected(f, &values))?;
    check_choices(input.field_type, &input.choices_text).map_err(|f| rejected(f, &values))?;

    let field = store
        .insert_field(NewFormField {
            form_id: def.id,
            key,
            label,
            field_type: input.field_type,
            required: input.required,
            choices_text: input.choices_text,
            is_displayed: input.is_displayed,
        })
        .await?;
    tracing::info!("Field {} ({}) added to form {}", field.id, field.key, def.id);
    Ok(field)
}

async fn field_of(
    store: &dyn Store,
    def: &FormDefinition,
    field_id: i64,
) -> Result<FormField, CrmError> {
    store
        .get_field(field_id)
        .await?
        .filter(|f| f.form_id == def.id)
        .ok_or_else(|| CrmError::not_found("field"))
}

/// Changing a label never re-derives the key; stored answers keep their keys.
pub async fn edit_field(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
    field_id: i64,
    patch: FieldPatch,
) -> Result<FormField, CrmError> {
    let def = editable_definition(store, viewer, form_id, "edit field").await?;
    let mut field = field_of(store, &def, field_id).await?;
    let values = patch.echo();

    if let Some(label) = patch.label.as_deref() {
        field.label = clean_label(label).map_err(|f| rejected(f, &values))?;
    }
    if let Some(key) = patch.key.as_deref() {
        field.key = normalize_key(key).map_err(|f| rejected(f, &values))?;
    }
    if let Some(field_type) = patch.field_type {
        field.field_type = field_type;
    }
    if let Some(required) = patch.required {
        field.required = required;
    }
    if let Some(choices_text) = patch.choices_text {
        field.choices_text = choices_text;
    }
    if let Some(order) = patch.order {
        if order < 0 {
            return Err(rejected(
                ValidationFailure::single("order", "Ensure this value is greater than or equal to 0."),
                &values,
            ));
        }
        field.order = order;
    }
    if let Some(is_displayed) = patch.is_displayed {
        field.is_displayed = is_displayed;
    }
    check_choices(field.field_type, &field.choices_text).map_err(|f| rejected(f, &values))?;

    let saved = store.update_field(&field).await?;
    tracing::info!("Field {} on form {} edited by user {}", saved.id, def.id, viewer.id);
    Ok(saved)
}

pub async fn delete_field(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
    field_id: i64,
) -> Result<(), CrmError> {
    let def = editable_definition(store, viewer, form_id, "delete field").await?;
    let field = field_of(store, &def, field_id).await?;
    store.delete_field(field.id).await?;
    tracing::info!("Field {} removed from form {}", field.id, def.id);
    Ok(())
}

/// Reads `{"ids": [..]}`; ids may be integers or integer strings.
pub fn parse_ordered_ids(payload: &Value) -> Result<Vec<i64>, ValidationFailure> {
    let ids = payload
        .get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationFailure::single("ids", "expected a list of field ids"))?;

    ids.iter()
        .map(|raw| {
            let parsed = match raw {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            parsed.ok_or_else(|| {
                ValidationFailure::single("ids", format!("{raw} is not an integer id"))
            })
        })
        .collect()
}

/// Sets `order = position` for each listed id of this form, atomically.
/// Ids of other forms are skipped; unlisted fields keep their order.
pub async fn reorder(
    store: &dyn Store,
    viewer: &User,
    form_id: i64,
    payload: &Value,
) -> Result<(), CrmError> {
    let def = editable_definition(store, viewer, form_id, "reorder fields").await?;
    let ids = parse_ordered_ids(payload).map_err(CrmError::Validation)?;

    let mut orders = Vec::with_capacity(ids.len());
    for (index, id) in ids.into_iter().enumerate() {
        let order = i32::try_from(index)
            .map_err(|_| CrmError::BadRequest("too many field ids".to_string()))?;
        orders.push((id, order));
    }

    store.reorder_fields(def.id, &orders).await?;
    tracing::info!("Fields of form {} reordered ({} ids)", def.id, orders.len());
    Ok(())
}
