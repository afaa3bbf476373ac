use crate::domain::compiler::{FieldSpec, RawInput};
use crate::domain::records::DiabetesRiskAssessment;
use crate::error::CrmError;
use crate::services::assessments;
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SchemaQuery {
    pub form_id: Option<i64>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/diabetes", post(create_diabetes))
        .route("/diabetes/schema", get(diabetes_schema))
        .with_state(state)
}

async fn create_diabetes(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Json(raw): Json<RawInput>,
) -> Result<(StatusCode, Json<DiabetesRiskAssessment>), CrmError> {
    let assessment = assessments::create(state.store.as_ref(), &viewer, &raw).await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

async fn diabetes_schema(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<Vec<FieldSpec>>, CrmError> {
    let fields = assessments::schema(state.store.as_ref(), &viewer, query.form_id).await?;
    Ok(Json(fields))
}
