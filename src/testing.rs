//! Fixtures shared by the unit and router tests.

use crate::db::{MemoryStore, Store};
use crate::domain::models::{NewUser, User, UserRole};
use crate::middleware::RateLimiter;
use crate::services::tables::TableRegistry;
use crate::state::{AppState, SharedState};
use crate::time_utils::LocalZone;
use std::sync::Arc;

pub const TEST_CODE: &str = "2468";

pub struct Cast {
    pub admin: User,
    pub manager: User,
    pub staff: User,
    pub other_staff: User,
    pub volunteer: User,
}

pub async fn user(store: &dyn Store, email: &str, role: Option<UserRole>) -> User {
    store
        .insert_user(NewUser {
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            hash: crate::db::seed::hash_code(TEST_CODE).unwrap(),
            role,
            is_superuser: false,
        })
        .await
        .unwrap()
}

pub async fn cast(store: &dyn Store) -> Cast {
    Cast {
        admin: user(store, "admin@example.org", Some(UserRole::Admin)).await,
        manager: user(store, "manager@example.org", Some(UserRole::Manager)).await,
        staff: user(store, "staff@example.org", Some(UserRole::Staff)).await,
        other_staff: user(store, "other@example.org", Some(UserRole::Staff)).await,
        volunteer: user(store, "volunteer@example.org", Some(UserRole::Volunteer)).await,
    }
}

pub fn session_key() -> Vec<u8> {
    vec![42u8; 32]
}

pub fn state_with(store: MemoryStore) -> SharedState {
    Arc::new(AppState {
        store: Arc::new(store),
        registry: Arc::new(TableRegistry::standard().unwrap()),
        zone: LocalZone::default(),
        session_key: session_key(),
        login_limiter: RateLimiter::new(5, 60),
        secure_cookie: false,
    })
}
