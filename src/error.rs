use crate::db::StoreError;
use crate::domain::compiler::{FieldErrors, RawInput};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Field errors plus the input that produced them, for re-display.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub errors: FieldErrors,
    pub values: RawInput,
}

impl ValidationFailure {
    pub fn new(errors: FieldErrors, values: RawInput) -> Self {
        Self { errors, values }
    }

    pub fn single(key: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), vec![message.into()]);
        Self {
            errors,
            values: RawInput::new(),
        }
    }

    /// Replaces the echoed input.
    pub fn with_values(mut self, values: RawInput) -> Self {
        self.values = values;
        self
    }

    /// First message, prefixed by its key.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .flat_map(|(key, messages)| messages.iter().map(move |m| format!("{key}: {m}")))
            .next()
            .unwrap_or_else(|| "invalid input".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("access denied: {operation}")]
    AccessDenied { operation: &'static str },
    #[error("validation failed: {}", .0.summary())]
    Validation(ValidationFailure),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Integrity(String),
    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for CrmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity(msg) => CrmError::Integrity(msg),
            other => CrmError::Storage(other),
        }
    }
}

impl CrmError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CrmError::NotFound(what.into())
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        match self {
            // Denials look exactly like absence.
            CrmError::NotFound(_) | CrmError::AccessDenied { .. } => (
                StatusCode::NOT_FOUND,
                Json(json!({"ok": false, "error": "not found"})),
            )
                .into_response(),
            CrmError::Validation(failure) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"ok": false, "errors": failure.errors, "values": failure.values})),
            )
                .into_response(),
            CrmError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": msg})),
            )
                .into_response(),
            CrmError::Integrity(msg) => (
                StatusCode::CONFLICT,
                Json(json!({"ok": false, "error": msg})),
            )
                .into_response(),
            CrmError::Storage(err) => {
                tracing::error!("Storage failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"ok": false, "error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_is_indistinguishable_from_not_found() {
        let denied = CrmError::AccessDenied { operation: "edit record" }.into_response();
        let missing = CrmError::not_found("record").into_response();
        assert_eq!(denied.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_integrity_maps_to_conflict() {
        let err: CrmError = StoreError::Integrity("duplicate key".to_string()).into();
        assert!(matches!(err, CrmError::Integrity(_)));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_summary_uses_first_error() {
        let failure = ValidationFailure::single("ids", "must be integers");
        assert_eq!(failure.summary(), "ids: must be integers");
    }
}
