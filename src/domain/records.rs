//! Fixed-schema record types served by the table engine.

use crate::db::TableSchema;
use crate::domain::compiler::{BoundValues, FieldErrors, FieldSpec};
use crate::domain::models::{FieldType, UserId};
use crate::domain::policy::Owned;
use crate::domain::scoring::{self, Ethnicity, Gender, RiskInputs, YesNo};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record type with a static table shape and a compiled editable form.
pub trait TableRecord: Owned + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn schema() -> &'static TableSchema;

    fn id(&self) -> i64;

    /// Editable fields in form order; ownership and audit columns are excluded.
    fn editable_fields() -> Vec<FieldSpec>;

    fn from_form(values: &BoundValues, owner: UserId) -> Result<Self, FieldErrors>;

    fn apply_form(&mut self, values: &BoundValues) -> Result<(), FieldErrors>;
}

/// A bound NUMBER narrowed to the INTEGER column width.
fn int_field(values: &BoundValues, key: &str) -> Result<Option<i32>, FieldErrors> {
    let Some(n) = values.integer(key) else {
        return Ok(None);
    };
    i32::try_from(n).map(Some).map_err(|_| {
        let message = if n > 0 {
            format!("Ensure this value is less than or equal to {}.", i32::MAX)
        } else {
            format!("Ensure this value is greater than or equal to {}.", i32::MIN)
        };
        field_error(key, message)
    })
}

fn field_error(key: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(key.to_string(), vec![message.into()]);
    errors
}

pub static HEALTHCHECK_SCHEMA: TableSchema = TableSchema {
    table: "healthchecks",
    owner_column: "created_by",
    created_column: "created_at",
    columns: &[
        "forename",
        "surname",
        "gender",
        "ethnicity",
        "postcode",
        "age",
        "gp",
        "systolic",
        "diastolic",
        "pulse",
        "bmi",
        "risk",
        "created_by",
        "check_date",
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub id: i64,
    pub forename: String,
    pub surname: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub postcode: String,
    pub age: Option<i32>,
    #[serde(default)]
    pub gp: String,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub pulse: Option<i32>,
    pub bmi: Option<Decimal>,
    #[serde(default)]
    pub risk: String,
    pub created_by: UserId,
    pub check_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Owned for HealthCheck {
    fn owner_id(&self) -> Option<UserId> {
        Some(self.created_by)
    }
}

impl HealthCheck {
    /// Numeric reading of a chartable column; non-numeric text yields `None`.
    pub fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "systolic" => self.systolic.map(f64::from),
            "diastolic" => self.diastolic.map(f64::from),
            "pulse" => self.pulse.map(f64::from),
            "age" => self.age.map(f64::from),
            "bmi" => self.bmi.and_then(|b| b.to_f64()),
            "risk" => self.risk.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn assign(&mut self, values: &BoundValues) -> Result<(), FieldErrors> {
        self.forename = values.text_or_empty("forename");
        self.surname = values.text_or_empty("surname");
        self.gender = values.text_or_empty("gender");
        self.ethnicity = values.text_or_empty("ethnicity");
        self.postcode = values.text_or_empty("postcode");
        self.age = int_field(values, "age")?;
        if self.age.map_or(false, |a| a < 0) {
            return Err(field_error("age", "Ensure this value is greater than or equal to 0."));
        }
        self.gp = values.text_or_empty("gp");
        self.systolic = int_field(values, "systolic")?;
        self.diastolic = int_field(values, "diastolic")?;
        self.pulse = int_field(values, "pulse")?;
        self.bmi = values.decimal("bmi");
        if self.bmi.map_or(false, |b| b.abs() >= Decimal::new(1000, 0)) {
            return Err(field_error("bmi", "Ensure that there are no more than 3 digits before the decimal point."));
        }
        self.risk = values.text_or_empty("risk");
        self.check_date = values.date("check_date");
        Ok(())
    }
}

impl TableRecord for HealthCheck {
    fn schema() -> &'static TableSchema {
        &HEALTHCHECK_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn editable_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("forename", "Forename", FieldType::Text).required(),
            FieldSpec::new("surname", "Surname", FieldType::Text).required(),
            FieldSpec::new("gender", "Gender", FieldType::Text),
            FieldSpec::new("ethnicity", "Ethnicity", FieldType::Text),
            FieldSpec::new("postcode", "Postcode", FieldType::Text),
            FieldSpec::new("age", "Age", FieldType::Number),
            FieldSpec::new("gp", "GP", FieldType::Text),
            FieldSpec::new("systolic", "Systolic", FieldType::Number),
            FieldSpec::new("diastolic", "Diastolic", FieldType::Number),
            FieldSpec::new("pulse", "Pulse", FieldType::Number),
            FieldSpec::new("bmi", "BMI", FieldType::Decimal),
            FieldSpec::new("risk", "Risk", FieldType::Text),
            FieldSpec::new("check_date", "Check date", FieldType::Date),
        ]
    }

    fn from_form(values: &BoundValues, owner: UserId) -> Result<Self, FieldErrors> {
        let mut record = HealthCheck {
            id: 0,
            forename: String::new(),
            surname: String::new(),
            gender: String::new(),
            ethnicity: String::new(),
            postcode: String::new(),
            age: None,
            gp: String::new(),
            systolic: None,
            diastolic: None,
            pulse: None,
            bmi: None,
            risk: String::new(),
            created_by: owner,
            check_date: None,
            created_at: None,
        };
        record.assign(values)?;
        Ok(record)
    }

    fn apply_form(&mut self, values: &BoundValues) -> Result<(), FieldErrors> {
        self.assign(values)
    }
}

pub static DIABETES_SCHEMA: TableSchema = TableSchema {
    table: "diabetes_risk_assessments",
    owner_column: "submitted_by",
    created_column: "submitted_at",
    columns: &[
        "forename",
        "surname",
        "gender",
        "ethnicity",
        "postcode",
        "age",
        "gp",
        "systolic",
        "diastolic",
        "pulse",
        "waist_cm",
        "height_cm",
        "weight_kg",
        "bmi",
        "family_history",
        "high_bp",
        "age_score",
        "gender_score",
        "ethnicity_score",
        "family_history_score",
        "waist_score",
        "bmi_score",
        "bp_score",
        "total_score",
        "risk_level",
        "submitted_by",
    ],
};

/// Full-capture diabetes risk assessment: raw inputs plus every score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiabetesRiskAssessment {
    #[serde(default)]
    pub id: i64,
    pub forename: String,
    pub surname: String,
    pub gender: String,
    pub ethnicity: String,
    #[serde(default)]
    pub postcode: String,
    pub age: i32,
    #[serde(default)]
    pub gp: String,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub pulse: Option<i32>,
    pub waist_cm: f64,
    pub height_cm: i32,
    pub weight_kg: f64,
    pub bmi: f64,
    pub family_history: String,
    pub high_bp: String,
    pub age_score: i32,
    pub gender_score: i32,
    pub ethnicity_score: i32,
    pub family_history_score: i32,
    pub waist_score: i32,
    pub bmi_score: i32,
    pub bp_score: i32,
    pub total_score: i32,
    pub risk_level: String,
    pub submitted_by: UserId,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Owned for DiabetesRiskAssessment {
    fn owner_id(&self) -> Option<UserId> {
        Some(self.submitted_by)
    }
}

fn required_decimal(values: &BoundValues, key: &str) -> Result<f64, FieldErrors> {
    values
        .decimal(key)
        .and_then(|d| d.to_f64())
        .ok_or_else(|| field_error(key, "This field is required."))
}

fn positive(key: &str, value: f64) -> Result<f64, FieldErrors> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(field_error(key, "Ensure this value is greater than 0."))
    }
}

impl DiabetesRiskAssessment {
    fn build(values: &BoundValues, owner: UserId) -> Result<Self, FieldErrors> {
        let age = int_field(values, "age")?
            .ok_or_else(|| field_error("age", "This field is required."))?;
        let age_years = u32::try_from(age)
            .map_err(|_| field_error("age", "Ensure this value is greater than or equal to 0."))?;
        let height_cm = int_field(values, "height_cm")?
            .filter(|h| *h > 0)
            .ok_or_else(|| field_error("height_cm", "Ensure this value is greater than 0."))?;
        let systolic = int_field(values, "systolic")?;
        let diastolic = int_field(values, "diastolic")?;
        let pulse = int_field(values, "pulse")?;
        let waist_cm = positive("waist_cm", required_decimal(values, "waist_cm")?)?;
        let weight_kg = positive("weight_kg", required_decimal(values, "weight_kg")?)?;

        let gender_raw = values.text_or_empty("gender");
        let ethnicity_raw = values.text_or_empty("ethnicity");
        let family_raw = values.text_or_empty("family_history");
        let bp_raw = values.text_or_empty("high_bp");

        let inputs = RiskInputs {
            age: age_years,
            gender: gender_raw
                .parse::<Gender>()
                .map_err(|e| field_error("gender", e.to_string()))?,
            ethnicity: ethnicity_raw
                .parse::<Ethnicity>()
                .map_err(|e| field_error("ethnicity", e.to_string()))?,
            family_history: YesNo::parse("family_history", &family_raw)
                .map_err(|e| field_error("family_history", e.to_string()))?,
            high_bp: YesNo::parse("high_bp", &bp_raw)
                .map_err(|e| field_error("high_bp", e.to_string()))?,
            waist_cm,
            height_cm: f64::from(height_cm),
            weight_kg,
        };
        let scores = scoring::assess(&inputs);

        Ok(Self {
            id: 0,
            forename: values.text_or_empty("forename"),
            surname: values.text_or_empty("surname"),
            gender: gender_raw,
            ethnicity: ethnicity_raw,
            postcode: values.text_or_empty("postcode"),
            age,
            gp: values.text_or_empty("gp"),
            systolic,
            diastolic,
            pulse,
            waist_cm,
            height_cm,
            weight_kg,
            bmi: scores.bmi,
            family_history: family_raw,
            high_bp: bp_raw,
            age_score: scores.age_score,
            gender_score: scores.gender_score,
            ethnicity_score: scores.ethnicity_score,
            family_history_score: scores.family_history_score,
            waist_score: scores.waist_score,
            bmi_score: scores.bmi_score,
            bp_score: scores.bp_score,
            total_score: scores.total_score,
            risk_level: scores.risk_level.to_string(),
            submitted_by: owner,
            submitted_at: None,
        })
    }
}

impl TableRecord for DiabetesRiskAssessment {
    fn schema() -> &'static TableSchema {
        &DIABETES_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn editable_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("forename", "Forename", FieldType::Text).required(),
            FieldSpec::new("surname", "Surname", FieldType::Text).required(),
            FieldSpec::new("gender", "Gender", FieldType::Choice)
                .required()
                .with_choices(&["F", "M"]),
            FieldSpec::new("ethnicity", "Ethnicity", FieldType::Choice)
                .required()
                .with_choices(&["WHITE", "OTHER"]),
            FieldSpec::new("postcode", "Postcode", FieldType::Text),
            FieldSpec::new("gp", "GP", FieldType::Text),
            FieldSpec::new("age", "Age", FieldType::Number).required(),
            FieldSpec::new("systolic", "Systolic", FieldType::Number),
            FieldSpec::new("diastolic", "Diastolic", FieldType::Number),
            FieldSpec::new("pulse", "Pulse", FieldType::Number),
            FieldSpec::new("waist_cm", "Waist (cm)", FieldType::Decimal).required(),
            FieldSpec::new("height_cm", "Height (cm)", FieldType::Number).required(),
            FieldSpec::new("weight_kg", "Weight (kg)", FieldType::Decimal).required(),
            FieldSpec::new("family_history", "Family history of diabetes", FieldType::Choice)
                .required()
                .with_choices(&["YES", "NO"]),
            FieldSpec::new("high_bp", "High blood pressure", FieldType::Choice)
                .required()
                .with_choices(&["YES", "NO"]),
        ]
    }

    fn from_form(values: &BoundValues, owner: UserId) -> Result<Self, FieldErrors> {
        Self::build(values, owner)
    }

    /// Edited inputs produce fresh scores.
    fn apply_form(&mut self, values: &BoundValues) -> Result<(), FieldErrors> {
        let rebuilt = Self::build(values, self.submitted_by)?;
        *self = Self {
            id: self.id,
            submitted_at: self.submitted_at,
            ..rebuilt
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compiler::{CompiledForm, RawInput, RawValue};

    fn raw(pairs: &[(&str, &str)]) -> RawInput {
        pairs.iter().map(|(k, v)| (k.to_string(), RawValue::from(*v))).collect()
    }

    fn diabetes_input() -> RawInput {
        raw(&[
            ("forename", "Ada"),
            ("surname", "Lovelace"),
            ("gender", "F"),
            ("ethnicity", "OTHER"),
            ("age", "62"),
            ("waist_cm", "101.5"),
            ("height_cm", "165"),
            ("weight_kg", "70"),
            ("family_history", "YES"),
            ("high_bp", "YES"),
        ])
    }

    #[test]
    fn test_schema_columns_cover_editable_fields() {
        for field in HealthCheck::editable_fields() {
            assert!(HealthCheck::schema().has_column(&field.key), "{}", field.key);
        }
        for field in DiabetesRiskAssessment::editable_fields() {
            assert!(DiabetesRiskAssessment::schema().has_column(&field.key), "{}", field.key);
        }
    }

    #[test]
    fn test_healthcheck_from_form() {
        let form = CompiledForm::compile(HealthCheck::editable_fields());
        let values = form
            .bind(&raw(&[
                ("forename", "Sam"),
                ("surname", "Jones"),
                ("bmi", "27.40"),
                ("check_date", "2024-04-02"),
            ]))
            .unwrap();
        let record = HealthCheck::from_form(&values, 5).unwrap();
        assert_eq!(record.created_by, 5);
        assert_eq!(record.bmi, Some(Decimal::new(2740, 2)));
        assert_eq!(record.numeric("bmi"), Some(27.4));
        assert_eq!(record.age, None);
        assert_eq!(record.owner_id(), Some(5));
    }

    #[test]
    fn test_diabetes_assessment_captures_inputs_and_scores() {
        let form = CompiledForm::compile(DiabetesRiskAssessment::editable_fields());
        let values = form.bind(&diabetes_input()).unwrap();
        let record = DiabetesRiskAssessment::from_form(&values, 9).unwrap();

        assert_eq!(record.bmi, 25.7);
        assert_eq!(record.age_score, 9);
        assert_eq!(record.gender_score, 0);
        assert_eq!(record.ethnicity_score, 6);
        assert_eq!(record.family_history_score, 5);
        assert_eq!(record.waist_score, 6);
        assert_eq!(record.bmi_score, 3);
        assert_eq!(record.bp_score, 5);
        assert_eq!(record.total_score, 34);
        assert_eq!(record.risk_level, "High");
        assert_eq!(record.waist_cm, 101.5);
    }

    #[test]
    fn test_diabetes_edit_recomputes_scores_and_keeps_identity() {
        let form = CompiledForm::compile(DiabetesRiskAssessment::editable_fields());
        let mut record =
            DiabetesRiskAssessment::from_form(&form.bind(&diabetes_input()).unwrap(), 9).unwrap();
        record.id = 42;

        let mut edited = diabetes_input();
        edited.insert("age".to_string(), RawValue::from("30"));
        edited.insert("family_history".to_string(), RawValue::from("NO"));
        record.apply_form(&form.bind(&edited).unwrap()).unwrap();

        assert_eq!(record.id, 42);
        assert_eq!(record.submitted_by, 9);
        assert_eq!(record.age_score, 0);
        assert_eq!(record.total_score, 20);
        assert_eq!(record.risk_level, "Moderate");
    }

    #[test]
    fn test_diabetes_rejects_zero_height() {
        let form = CompiledForm::compile(DiabetesRiskAssessment::editable_fields());
        let mut input = diabetes_input();
        input.insert("height_cm".to_string(), RawValue::from("0"));
        let errors = DiabetesRiskAssessment::from_form(&form.bind(&input).unwrap(), 1).unwrap_err();
        assert!(errors.contains_key("height_cm"));
    }

    #[test]
    fn test_diabetes_age_beyond_integer_range_is_a_field_error() {
        let form = CompiledForm::compile(DiabetesRiskAssessment::editable_fields());
        let mut input = diabetes_input();
        input.insert("age".to_string(), RawValue::from("3000000000"));
        let errors = DiabetesRiskAssessment::from_form(&form.bind(&input).unwrap(), 1).unwrap_err();
        assert_eq!(
            errors["age"],
            vec!["Ensure this value is less than or equal to 2147483647."]
        );

        input.insert("age".to_string(), RawValue::from("-1"));
        let errors = DiabetesRiskAssessment::from_form(&form.bind(&input).unwrap(), 1).unwrap_err();
        assert!(errors.contains_key("age"));
    }

    #[test]
    fn test_healthcheck_readings_beyond_integer_range_are_rejected() {
        let form = CompiledForm::compile(HealthCheck::editable_fields());
        let values = form
            .bind(&raw(&[
                ("forename", "Sam"),
                ("surname", "Jones"),
                ("systolic", "3000000000"),
            ]))
            .unwrap();
        let errors = HealthCheck::from_form(&values, 5).unwrap_err();
        assert_eq!(
            errors["systolic"],
            vec!["Ensure this value is less than or equal to 2147483647."]
        );

        let values = form
            .bind(&raw(&[("forename", "Sam"), ("surname", "Jones"), ("pulse", "72")]))
            .unwrap();
        assert_eq!(HealthCheck::from_form(&values, 5).unwrap().pulse, Some(72));
    }
}
