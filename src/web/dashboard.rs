use crate::analytics::charts::{self, ChartData, ChartRequest, PersonChoice};
use crate::analytics::dashboard::{self, DashboardSummary};
use crate::domain::records::HealthCheck;
use crate::error::CrmError;
use crate::services::tables::visible_records;
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

pub fn router(state: SharedState) -> Router {
    Router::new().route("/", get(summary)).with_state(state)
}

pub fn charts_router(state: SharedState) -> Router {
    Router::new()
        .route("/data", get(chart_data))
        .route("/people", get(people))
        .with_state(state)
}

async fn summary(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<DashboardSummary>, CrmError> {
    let summary = dashboard::summary(state.store.as_ref(), &state.zone, &viewer).await?;
    Ok(Json(summary))
}

async fn chart_data(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Query(request): Query<ChartRequest>,
) -> Result<Json<ChartData>, CrmError> {
    let checks: Vec<HealthCheck> = visible_records(state.store.as_ref(), &viewer, None).await?;
    let data = charts::chart_data(&checks, &state.zone, &request)
        .map_err(|e| CrmError::BadRequest(e.to_string()))?;
    Ok(Json(data))
}

async fn people(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<PersonChoice>>, CrmError> {
    let checks: Vec<HealthCheck> = visible_records(state.store.as_ref(), &viewer, None).await?;
    Ok(Json(charts::people(&checks)))
}
