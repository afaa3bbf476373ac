use crate::db::{DateBound, DateFrom, RecordFilter, Store};
use crate::domain::models::User;
use crate::domain::policy::{can_fill_forms, visibility_scope};
use crate::domain::records::{HealthCheck, TableRecord};
use crate::domain::window::DateWindow;
use crate::error::CrmError;
use crate::services::ensure;
use crate::time_utils::LocalZone;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_health_checks: u64,
    pub health_checks_this_month: u64,
}

/// Counts of health checks the viewer can see, in total and created this month.
pub async fn summary(
    store: &dyn Store,
    zone: &LocalZone,
    viewer: &User,
) -> Result<DashboardSummary, CrmError> {
    ensure(can_fill_forms(viewer), viewer, "view dashboard")?;
    let schema = HealthCheck::schema();
    let owner = visibility_scope(viewer);

    let total = store
        .count_records(
            schema,
            &RecordFilter {
                owner,
                ..RecordFilter::default()
            },
        )
        .await?;

    let since = DateWindow::Month.start(zone.today()).map(|start| DateBound {
        column: schema.created_column,
        from: DateFrom::Instant(zone.start_of_day(start)),
    });
    let this_month = store
        .count_records(
            schema,
            &RecordFilter {
                owner,
                since,
                ..RecordFilter::default()
            },
        )
        .await?;

    Ok(DashboardSummary {
        total_health_checks: total,
        health_checks_this_month: this_month,
    })
}
