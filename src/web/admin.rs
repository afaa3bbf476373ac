use crate::domain::models::UserId;
use crate::domain::policy::is_admin;
use crate::error::CrmError;
use crate::services::ensure;
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/users/:id", delete(delete_user))
        .with_state(state)
}

async fn deactivate_user(
    CurrentUser(admin): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<UserId>,
) -> Result<Json<Value>, CrmError> {
    ensure(is_admin(&admin), &admin, "deactivate user")?;

    if !state.store.set_user_active(id, false).await? {
        return Err(CrmError::not_found("user"));
    }
    tracing::info!("Admin {} deactivated user {}", admin.id, id);
    Ok(Json(json!({"ok": true})))
}

/// Users who still own records are refused with a conflict; deactivate them instead.
async fn delete_user(
    CurrentUser(admin): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<UserId>,
) -> Result<Json<Value>, CrmError> {
    ensure(is_admin(&admin), &admin, "delete user")?;

    if id == admin.id {
        return Err(CrmError::Integrity("cannot delete your own account".to_string()));
    }
    if !state.store.delete_user(id).await? {
        return Err(CrmError::not_found("user"));
    }
    tracing::info!("Admin {} deleted user {}", admin.id, id);
    Ok(Json(json!({"ok": true})))
}
