use crate::domain::models::{UserId, UserRole};
use crate::domain::policy::{effective_role, is_volunteer};
use crate::state::SharedState;
use crate::web::session;
use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub role: UserRole,
    pub name: String,
    pub landing: &'static str,
}

pub fn router(state: SharedState) -> Router {
    Router::new().route("/login", post(login)).with_state(state)
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = payload.email.trim().to_lowercase();

    if !state.login_limiter.check(&email).await {
        tracing::warn!("Login rate limit exceeded for {}", email);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let (user, hash) = state
        .store
        .find_login(&email)
        .await
        .map_err(|e| {
            tracing::error!("Login lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let parsed_hash = PasswordHash::new(&hash).map_err(|_| StatusCode::UNAUTHORIZED)?;
    Argon2::default()
        .verify_password(payload.code.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if !user.is_active {
        tracing::warn!("Inactive user {} attempted to log in", user.id);
        return Err(StatusCode::UNAUTHORIZED);
    }
    state.login_limiter.reset(&email).await;

    let token = session::sign_session(user.id, &state.session_key)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let cookie = session::session_cookie(
        &token,
        session::SESSION_HOURS * 3600,
        state.secure_cookie,
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
    );

    tracing::info!("User {} logged in", user.id);
    let resp = LoginResponse {
        user_id: user.id,
        role: effective_role(&user),
        landing: if is_volunteer(&user) { "forms" } else { "dashboard" },
        name: user.display_name,
    };
    Ok((headers, Json(resp)))
}
