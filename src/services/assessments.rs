//! Diabetes risk assessment capture.

use crate::db::{Store, StoreError};
use crate::domain::compiler::{CompiledForm, FieldErrors, FieldSpec, RawInput};
use crate::domain::models::User;
use crate::domain::policy::can_fill_forms;
use crate::domain::records::{DiabetesRiskAssessment, TableRecord};
use crate::error::{CrmError, ValidationFailure};
use crate::services::{ensure, forms};

fn assessment_form() -> CompiledForm {
    CompiledForm::compile(DiabetesRiskAssessment::editable_fields())
}

/// Field metadata, optionally ordered like an existing form definition.
pub async fn schema(
    store: &dyn Store,
    viewer: &User,
    form_id: Option<i64>,
) -> Result<Vec<FieldSpec>, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "open assessment")?;
    let form = assessment_form();
    let form = match form_id {
        Some(id) => {
            let keys: Vec<String> = forms::list_fields(store, viewer, id)
                .await?
                .into_iter()
                .map(|f| f.key)
                .collect();
            form.reordered(&keys)
        }
        None => form,
    };
    Ok(form.fields().to_vec())
}

/// Binds, scores, and stores one assessment; scores are never recomputed later.
pub async fn create(
    store: &dyn Store,
    viewer: &User,
    raw: &RawInput,
) -> Result<DiabetesRiskAssessment, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "submit assessment")?;

    let invalid = |errors: FieldErrors| CrmError::Validation(ValidationFailure::new(errors, raw.clone()));
    let values = assessment_form().bind(raw).map_err(invalid)?;
    let assessment = DiabetesRiskAssessment::from_form(&values, viewer.id).map_err(invalid)?;

    let row = serde_json::to_value(&assessment).map_err(StoreError::from)?;
    let stored = store
        .insert_record(DiabetesRiskAssessment::schema(), row)
        .await?;
    let saved: DiabetesRiskAssessment = serde_json::from_value(stored).map_err(StoreError::from)?;
    tracing::info!(
        "Assessment {} scored {} ({}) for user {}",
        saved.id,
        saved.total_score,
        saved.risk_level,
        viewer.id
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, RecordFilter};
    use crate::domain::compiler::RawValue;
    use crate::domain::models::{FieldType, FormKind};
    use crate::services::forms::{add_field, create_definition, reorder, DefinitionInput, FieldInput};
    use crate::testing::cast;
    use serde_json::json;

    fn input() -> RawInput {
        [
            ("forename", "Ada"),
            ("surname", "King"),
            ("gender", "F"),
            ("ethnicity", "WHITE"),
            ("age", "49"),
            ("waist_cm", "89.9"),
            ("height_cm", "170"),
            ("weight_kg", "60"),
            ("family_history", "NO"),
            ("high_bp", "NO"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
        .collect()
    }

    #[tokio::test]
    async fn test_volunteer_can_submit_and_scores_are_stored() {
        let store = MemoryStore::new();
        let people = cast(&store).await;

        let saved = create(&store, &people.volunteer, &input()).await.unwrap();
        assert_eq!(saved.total_score, 0);
        assert_eq!(saved.risk_level, "Low");
        assert_eq!(saved.submitted_by, people.volunteer.id);
        assert!(saved.submitted_at.is_some());

        let rows = store
            .query_records(DiabetesRiskAssessment::schema(), &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["bmi"], json!(20.8));
    }

    #[tokio::test]
    async fn test_unknown_choice_is_rejected_with_values() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let mut bad = input();
        bad.insert("gender".to_string(), RawValue::from("X"));

        match create(&store, &people.staff, &bad).await.unwrap_err() {
            CrmError::Validation(failure) => {
                assert!(failure.errors.contains_key("gender"));
                assert_eq!(failure.values["gender"], RawValue::from("X"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_follows_form_ordering() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let def = create_definition(
            &store,
            &people.staff,
            DefinitionInput {
                name: "Check".to_string(),
                description: String::new(),
                kind: FormKind::Healthcheck,
            },
        )
        .await
        .unwrap();
        let mut ids = Vec::new();
        for key in ["surname", "age", "forename"] {
            let field = add_field(
                &store,
                &people.staff,
                def.id,
                FieldInput {
                    label: key.to_string(),
                    key: Some(key.to_string()),
                    field_type: FieldType::Text,
                    required: false,
                    choices_text: String::new(),
                    is_displayed: true,
                },
            )
            .await
            .unwrap();
            ids.push(field.id);
        }
        reorder(&store, &people.staff, def.id, &json!({"ids": [ids[1], ids[0], ids[2]]}))
            .await
            .unwrap();

        let fields = schema(&store, &people.staff, Some(def.id)).await.unwrap();
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(&keys[..3], &["age", "surname", "forename"]);
        assert_eq!(fields.len(), DiabetesRiskAssessment::editable_fields().len());
    }
}
