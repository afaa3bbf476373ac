//! Dynamic form compiler.
//!
//! Turns an ordered list of field descriptors into a [`CompiledForm`] that
//! binds raw submitted strings into typed values, or reports per-field
//! errors. Binding is all-or-nothing.

use crate::domain::models::{parse_choices, Answers, FieldType, FormField};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Raw request input: one key may carry several values (last one wins).
pub type RawInput = BTreeMap<String, RawValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    One(String),
    Many(Vec<String>),
}

impl RawValue {
    pub fn last(&self) -> Option<&str> {
        match self {
            RawValue::One(v) => Some(v.as_str()),
            RawValue::Many(vs) => vs.last().map(String::as_str),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::One(value.to_string())
    }
}

/// Metadata of one compiled field, also what the renderer receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default = "default_displayed")]
    pub is_displayed: bool,
}

fn default_displayed() -> bool {
    true
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            field_type,
            required: false,
            choices: Vec::new(),
            is_displayed: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }
}

impl From<&FormField> for FieldSpec {
    fn from(field: &FormField) -> Self {
        Self {
            key: field.key.clone(),
            label: field.label.clone(),
            field_type: field.field_type,
            required: field.required,
            choices: parse_choices(&field.choices_text),
            is_displayed: field.is_displayed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    /// An optional field left blank.
    Empty,
}

impl FieldValue {
    /// Serializable form: numbers stay numbers, decimals keep their exact
    /// text, dates become ISO strings, blanks become null.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(n) => Value::from(*n),
            FieldValue::Decimal(d) => Value::String(d.to_string()),
            FieldValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            FieldValue::Empty => Value::Null,
        }
    }
}

/// Successfully bound values, in compiled field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundValues {
    values: Vec<(String, FieldValue)>,
}

impl BoundValues {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text value, or an empty string for blanks and missing keys.
    pub fn text_or_empty(&self, key: &str) -> String {
        self.text(key).unwrap_or_default().to_string()
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(FieldValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        match self.get(key) {
            Some(FieldValue::Decimal(d)) => Some(*d),
            Some(FieldValue::Integer(n)) => Some(Decimal::from(*n)),
            _ => None,
        }
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        match self.get(key) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_answers(self) -> Answers {
        self.values
            .into_iter()
            .map(|(k, v)| {
                let json = v.to_json();
                (k, json)
            })
            .collect()
    }
}

type Binder = fn(&FieldSpec, &str) -> Result<FieldValue, String>;

fn binder_for(field_type: FieldType) -> Binder {
    match field_type {
        FieldType::Text => bind_text,
        FieldType::Number => bind_number,
        FieldType::Decimal => bind_decimal,
        FieldType::Date => bind_date,
        FieldType::Choice => bind_choice,
    }
}

fn bind_text(_field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    Ok(FieldValue::Text(raw.to_string()))
}

fn bind_number(_field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    // "37.0" and "37.00" are whole numbers too.
    let digits = match raw.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
        _ => raw,
    };
    digits
        .parse::<i64>()
        .map(FieldValue::Integer)
        .map_err(|_| "Enter a whole number.".to_string())
}

fn bind_decimal(_field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    Decimal::from_str(raw)
        .map(FieldValue::Decimal)
        .map_err(|_| "Enter a number.".to_string())
}

fn bind_date(_field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(FieldValue::Date)
        .map_err(|_| "Enter a valid date.".to_string())
}

fn bind_choice(field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    let allowed: HashSet<&str> = field.choices.iter().map(|c| c.trim()).collect();
    if allowed.contains(raw) {
        Ok(FieldValue::Text(raw.to_string()))
    } else {
        Err(format!(
            "Select a valid choice. {raw} is not one of the available choices."
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledForm {
    fields: Vec<FieldSpec>,
}

impl CompiledForm {
    /// Field iteration order of the result equals the input order.
    pub fn compile<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn from_form_fields(fields: &[FormField]) -> Self {
        Self::compile(fields.iter().map(FieldSpec::from))
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Reorders fields so the listed keys come first, in the listed order.
    /// Unknown keys are skipped; unlisted fields keep their relative order.
    pub fn reordered<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let mut ordered: Vec<FieldSpec> = Vec::with_capacity(self.fields.len());
        for key in keys {
            if let Some(field) = self.field(key.as_ref()) {
                if !ordered.iter().any(|f| f.key == field.key) {
                    ordered.push(field.clone());
                }
            }
        }
        for field in &self.fields {
            if !ordered.iter().any(|f| f.key == field.key) {
                ordered.push(field.clone());
            }
        }
        Self { fields: ordered }
    }

    pub fn bind(&self, raw: &RawInput) -> Result<BoundValues, FieldErrors> {
        let mut values = Vec::with_capacity(self.fields.len());
        let mut errors = FieldErrors::new();

        for field in &self.fields {
            let input = raw
                .get(&field.key)
                .and_then(RawValue::last)
                .map(str::trim)
                .filter(|s| !s.is_empty());

            let bound = match input {
                None if field.required => Err("This field is required.".to_string()),
                None => Ok(FieldValue::Empty),
                Some(text) => binder_for(field.field_type)(field, text),
            };

            match bound {
                Ok(value) => values.push((field.key.clone(), value)),
                Err(message) => errors.entry(field.key.clone()).or_default().push(message),
            }
        }

        if errors.is_empty() {
            Ok(BoundValues { values })
        } else {
            Err(errors)
        }
    }

    /// Renders stored JSON values back into raw input for re-editing.
    pub fn raw_from_json(&self, stored: &Value) -> RawInput {
        self.fields
            .iter()
            .map(|field| {
                let text = match stored.get(&field.key) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    _ => String::new(),
                };
                (field.key.clone(), RawValue::One(text))
            })
            .collect()
    }
}
