pub mod assessments;
pub mod forms;
pub mod submissions;
pub mod tables;

use crate::domain::models::User;
use crate::error::CrmError;

/// Turns a failed policy check into a logged denial.
pub(crate) fn ensure(allowed: bool, viewer: &User, operation: &'static str) -> Result<(), CrmError> {
    if allowed {
        return Ok(());
    }
    tracing::warn!("Access denied: user {} attempted {}", viewer.id, operation);
    Err(CrmError::AccessDenied { operation })
}
