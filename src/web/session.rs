use crate::domain::models::{User, UserId};
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
}

pub fn sign_session(user_id: UserId, key: &[u8]) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::hours(SESSION_HOURS);
    sign_claims(user_id, exp.timestamp(), key)
}

fn sign_claims(user_id: UserId, exp: i64, key: &[u8]) -> Result<String, SessionError> {
    let payload = format!("{}|{}", user_id, exp);
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let (user_id, exp) = payload.split_once('|').ok_or(SessionError::Invalid)?;
    let user_id: UserId = user_id.parse().map_err(|_| SessionError::Invalid)?;
    let exp: i64 = exp.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, exp })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("session={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure_flag}")
}

/// The authenticated, active user behind the request.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        let claims = verify_session(&token, &shared_state.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

        let user = shared_state
            .store
            .find_user(claims.user_id)
            .await
            .map_err(|e| {
                tracing::error!("User lookup failed for session: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let Some(user) = user else {
            return Err(StatusCode::UNAUTHORIZED);
        };

        if !user.is_active {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(CurrentUser(user))
    }
}
